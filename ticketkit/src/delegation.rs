//! Constrained delegation (S4U) and the single-shot ticket acquisitions.
//!
//! With bare credentials there is exactly one candidate: a fresh logon, then
//! one S4U exchange, and either failure ends the operation. With a credential
//! cache every live TGT is a candidate. Candidates are tried strictly in cache
//! order, the first success wins, and every failure before it is kept.

use crate::{
    exchange::{ExchangeReply, KdcTarget, KerberosCredential, TgtSession, TicketExchange},
    Credential, CredentialCache, Enctype, Error, ExchangeError, Kirbi, Result, Spn,
};
use tracing::{debug, info, warn};

/// What the orchestrator authenticates with.
#[derive(Debug, Clone, Copy)]
pub enum DelegationSource<'a> {
    Credential(&'a KerberosCredential),
    Cache(&'a CredentialCache),
}

/// One cached TGT bound to the KDC for the duration of one exchange.
#[derive(Debug)]
pub struct DelegationAttempt<'a> {
    pub index: usize,
    pub credential: &'a Credential,
    session: TgtSession,
}

impl<'a> DelegationAttempt<'a> {
    fn new(index: usize, credential: &'a Credential, target: &KdcTarget) -> Self {
        Self {
            index,
            credential,
            session: TgtSession::from_credential(target, credential),
        }
    }

    /// `#<index> <client> (<server>)`, used to tag failures.
    pub fn identifier(&self) -> String {
        format!(
            "#{} {} ({})",
            self.index, self.credential.client, self.credential.server
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegated {
    pub reply: ExchangeReply,
    /// Cache index of the TGT that worked; `None` after a fresh logon.
    pub candidate: Option<usize>,
    /// Candidates that failed before the winning one, in attempt order.
    pub failures: Vec<ExchangeError>,
}

impl Delegated {
    pub fn to_kirbi(&self) -> Kirbi {
        self.reply.to_kirbi()
    }
}

/// Obtains a ticket for `service` in the name of `target_user`.
pub async fn delegate(
    exchange: &dyn TicketExchange,
    target: &KdcTarget,
    source: DelegationSource<'_>,
    target_user: &Spn,
    service: &Spn,
) -> Result<Delegated> {
    match source {
        DelegationSource::Credential(credential) => {
            debug!(user = %credential.user, kdc = %target, "requesting TGT");
            let tgt = exchange.get_tgt(credential, target).await?;
            let session = tgt.session(target);
            let reply = exchange
                .get_service_ticket_for(&session, target_user, service)
                .await?;
            info!(%target_user, %service, "got delegated service ticket");
            Ok(Delegated {
                reply,
                candidate: None,
                failures: vec![],
            })
        }
        DelegationSource::Cache(cache) => {
            delegate_from_cache(exchange, target, cache, target_user, service).await
        }
    }
}

async fn delegate_from_cache(
    exchange: &dyn TicketExchange,
    target: &KdcTarget,
    cache: &CredentialCache,
    target_user: &Spn,
    service: &Spn,
) -> Result<Delegated> {
    let mut failures = vec![];
    for (index, credential) in cache.tgts() {
        let attempt = DelegationAttempt::new(index, credential, target);
        debug!(candidate = %attempt.identifier(), "trying cached TGT");
        match exchange
            .get_service_ticket_for(&attempt.session, target_user, service)
            .await
        {
            Ok(reply) => {
                info!(
                    candidate = %attempt.identifier(),
                    %target_user,
                    %service,
                    "got delegated service ticket"
                );
                return Ok(Delegated {
                    reply,
                    candidate: Some(index),
                    failures,
                });
            }
            Err(err) => {
                warn!(candidate = %attempt.identifier(), reason = %err.reason, "cached TGT failed");
                failures.push(ExchangeError::new(attempt.identifier(), err.reason));
            }
        }
    }
    Err(Error::ExhaustedCandidates(failures))
}

/// One logon, no fallback.
pub async fn acquire_tgt(
    exchange: &dyn TicketExchange,
    target: &KdcTarget,
    credential: &KerberosCredential,
) -> Result<Kirbi> {
    let reply = exchange.get_tgt(credential, target).await?;
    info!(user = %credential.user, "got TGT");
    Ok(reply.to_kirbi())
}

/// One logon followed by one TGS exchange for `spn`; an empty `etypes` lets
/// the exchange client choose.
pub async fn acquire_tgs(
    exchange: &dyn TicketExchange,
    target: &KdcTarget,
    credential: &KerberosCredential,
    spn: &Spn,
    etypes: &[Enctype],
) -> Result<Kirbi> {
    let tgt = exchange.get_tgt(credential, target).await?;
    let reply = exchange
        .get_tgs(&tgt.session(target), spn, etypes)
        .await?;
    info!(user = %credential.user, %spn, "got service ticket");
    Ok(reply.to_kirbi())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        exchange::{mock::MockExchange, Secret},
        NameType, Principal,
    };

    fn target() -> KdcTarget {
        KdcTarget::new("dc01.corp.local")
    }

    fn users() -> (Spn, Spn) {
        (
            Spn::new("administrator", "CORP.LOCAL"),
            Spn::new("cifs/fs01.corp.local", "CORP.LOCAL"),
        )
    }

    /// A cache holding one TGT per client, plus a service ticket in between.
    fn cache(clients: &[&str]) -> CredentialCache {
        let mut cache = CredentialCache::default();
        for client in clients {
            let reply = crate::exchange::mock::reply(
                Principal::new(NameType::PRINCIPAL, &[*client], "CORP.LOCAL"),
                Principal::tgs("CORP.LOCAL"),
                Enctype::AES256_CTS_HMAC_SHA1_96,
            );
            cache = cache.with_kirbi(&reply.to_kirbi());
            let service = crate::exchange::mock::reply(
                Principal::new(NameType::PRINCIPAL, &[*client], "CORP.LOCAL"),
                Principal::new(NameType::SRV_INST, &["http", "web01"], "CORP.LOCAL"),
                Enctype::AES256_CTS_HMAC_SHA1_96,
            );
            cache = cache.with_kirbi(&service.to_kirbi());
        }
        cache
    }

    #[tokio::test]
    async fn first_success_wins() {
        let exchange = MockExchange::failing(&["a@CORP.LOCAL", "c@CORP.LOCAL"]);
        let cache = cache(&["a", "b", "c"]);
        let (user, service) = users();
        let delegated = delegate(
            &exchange,
            &target(),
            DelegationSource::Cache(&cache),
            &user,
            &service,
        )
        .await
        .unwrap();
        assert_eq!(exchange.calls(), vec!["s4u a@CORP.LOCAL", "s4u b@CORP.LOCAL"]);
        assert_eq!(delegated.candidate, Some(2));
        assert_eq!(delegated.failures.len(), 1);
        assert!(delegated.failures[0].source_identifier.starts_with("#0 a@CORP.LOCAL"));
        assert_eq!(
            delegated.reply.enc_part.server.to_string(),
            "cifs/fs01.corp.local@CORP.LOCAL"
        );
        let kirbi = Kirbi::parse(&delegated.to_kirbi().to_bytes().unwrap()).unwrap();
        assert_eq!(kirbi.ticket, delegated.reply.ticket);
    }

    #[tokio::test]
    async fn exhaustion_keeps_every_reason_in_order() {
        let exchange =
            MockExchange::failing(&["a@CORP.LOCAL", "b@CORP.LOCAL", "c@CORP.LOCAL"]);
        let cache = cache(&["a", "b", "c"]);
        let (user, service) = users();
        let err = delegate(
            &exchange,
            &target(),
            DelegationSource::Cache(&cache),
            &user,
            &service,
        )
        .await
        .unwrap_err();
        let identifiers: Vec<&str> = err
            .candidate_failures()
            .iter()
            .map(|failure| failure.source_identifier.split(' ').next().unwrap_or_default())
            .collect();
        assert_eq!(identifiers, vec!["#0", "#2", "#4"]);
        assert!(err
            .candidate_failures()
            .iter()
            .all(|failure| failure.reason == "KDC_ERR_S_PRINCIPAL_UNKNOWN"));
        assert_eq!(exchange.calls().len(), 3);
    }

    #[tokio::test]
    async fn cache_without_tgts_is_exhausted() {
        let exchange = MockExchange::default();
        let (user, service) = users();
        let cache = CredentialCache::default();
        let err = delegate(
            &exchange,
            &target(),
            DelegationSource::Cache(&cache),
            &user,
            &service,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::ExhaustedCandidates(ref failures) if failures.is_empty()));
        assert!(exchange.calls().is_empty());
    }

    #[tokio::test]
    async fn fresh_logon_failure_is_fatal() {
        let exchange = MockExchange::failing(&["svc_web@CORP.LOCAL"]);
        let credential = KerberosCredential {
            user: Spn::new("svc_web", "CORP.LOCAL"),
            secret: Secret::Password("Summer2024!".to_owned()),
        };
        let (user, service) = users();
        let err = delegate(
            &exchange,
            &target(),
            DelegationSource::Credential(&credential),
            &user,
            &service,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Exchange(_)));
        assert_eq!(exchange.calls(), vec!["tgt svc_web@CORP.LOCAL"]);
    }

    #[tokio::test]
    async fn fresh_logon_then_s4u() {
        let exchange = MockExchange::default();
        let credential = KerberosCredential {
            user: Spn::new("svc_web", "CORP.LOCAL"),
            secret: Secret::NtHash([0x31; 16]),
        };
        let (user, service) = users();
        let delegated = delegate(
            &exchange,
            &target(),
            DelegationSource::Credential(&credential),
            &user,
            &service,
        )
        .await
        .unwrap();
        assert_eq!(delegated.candidate, None);
        assert_eq!(
            exchange.calls(),
            vec!["tgt svc_web@CORP.LOCAL", "s4u svc_web@CORP.LOCAL"]
        );
    }

    #[tokio::test]
    async fn acquire_tgs_requests_the_spn() {
        let exchange = MockExchange::default();
        let credential = KerberosCredential {
            user: Spn::new("alice", "CORP.LOCAL"),
            secret: Secret::Password("x".to_owned()),
        };
        let (_, service) = users();
        let kirbi = acquire_tgs(
            &exchange,
            &target(),
            &credential,
            &service,
            &[Enctype::ARCFOUR_HMAC],
        )
        .await
        .unwrap();
        assert_eq!(
            kirbi.info.server.unwrap().to_string(),
            "cifs/fs01.corp.local@CORP.LOCAL"
        );
        assert_eq!(kirbi.info.key.enctype, Enctype::ARCFOUR_HMAC);

        let tgt = acquire_tgt(&exchange, &target(), &credential).await.unwrap();
        assert!(tgt.to_credential().is_tgt());
    }
}

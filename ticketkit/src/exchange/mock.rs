use super::{
    EncRepPart, ExchangeReply, ExchangeResult, KdcTarget, KerberosCredential, PreauthReply,
    TgtSession, TicketExchange,
};
use crate::{
    ticket::{EncData, Ticket},
    Enctype, ExchangeError, Keyblock, NameType, Principal, Spn,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::{collections::HashSet, sync::Mutex};

/// Scripted KDC. Every name listed in `failing` gets an error back, and every
/// call is recorded as `<operation> <name>`.
#[derive(Default)]
pub(crate) struct MockExchange {
    pub(crate) failing: HashSet<String>,
    pub(crate) preauth_required: HashSet<String>,
    pub(crate) existing: HashSet<String>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl MockExchange {
    pub(crate) fn failing(names: &[&str]) -> Self {
        Self {
            failing: names.iter().map(|name| name.to_string()).collect(),
            ..Self::default()
        }
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, operation: &str, name: &str) -> ExchangeResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("{} {}", operation, name));
        if self.failing.contains(name) {
            return Err(ExchangeError::new(name, "KDC_ERR_S_PRINCIPAL_UNKNOWN"));
        }
        Ok(())
    }
}

pub(crate) fn reply(client: Principal, server: Principal, etype: Enctype) -> ExchangeReply {
    let ticket = Ticket::new(
        server.clone(),
        EncData {
            enctype: etype,
            kvno: Some(2),
            ciphertext: (0u8..48).collect(),
        },
    );
    let authtime = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
    ExchangeReply {
        ticket: ticket.encode(),
        client,
        session_key: Keyblock::new(etype, vec![0x11; 16]),
        enc_part: EncRepPart {
            flags: 0x40a10000,
            authtime,
            starttime: Some(authtime),
            endtime: Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap(),
            renew_till: None,
            server,
        },
    }
}

#[async_trait]
impl TicketExchange for MockExchange {
    async fn get_tgt(
        &self,
        credential: &KerberosCredential,
        _target: &KdcTarget,
    ) -> ExchangeResult<ExchangeReply> {
        let user = &credential.user;
        self.record("tgt", &user.to_string())?;
        Ok(reply(
            user.to_principal(),
            Principal::tgs(&user.domain),
            Enctype::AES256_CTS_HMAC_SHA1_96,
        ))
    }

    async fn get_tgs(
        &self,
        session: &TgtSession,
        spn: &Spn,
        etypes: &[Enctype],
    ) -> ExchangeResult<ExchangeReply> {
        self.record("tgs", &spn.to_string())?;
        let etype = etypes.first().copied().unwrap_or(Enctype::ARCFOUR_HMAC);
        Ok(reply(session.client.clone(), spn.to_principal(), etype))
    }

    async fn get_service_ticket_for(
        &self,
        session: &TgtSession,
        target_user: &Spn,
        service: &Spn,
    ) -> ExchangeResult<ExchangeReply> {
        self.record("s4u", &session.client.to_string())?;
        let mut client = target_user.to_principal();
        client.name_type = NameType::ENTERPRISE_PRINCIPAL;
        Ok(reply(
            client,
            service.to_principal(),
            Enctype::AES256_CTS_HMAC_SHA1_96,
        ))
    }

    async fn get_tgt_without_preauth(
        &self,
        _target: &KdcTarget,
        user: &Spn,
        etype: Enctype,
    ) -> ExchangeResult<PreauthReply> {
        let name = user.to_string();
        self.record("asreq", &name)?;
        if self.preauth_required.contains(&name) {
            return Ok(PreauthReply::Required);
        }
        Ok(PreauthReply::NotRequired {
            realm: user.domain.clone(),
            enc_part: EncData {
                enctype: etype,
                kvno: None,
                ciphertext: (0u8..40).collect(),
            },
        })
    }

    async fn probe_user(&self, _target: &KdcTarget, user: &Spn) -> ExchangeResult<bool> {
        let name = user.to_string();
        self.record("probe", &name)?;
        Ok(self.existing.contains(&name))
    }
}

//! The network side of Kerberos, consumed as a capability.
//!
//! Encoding AS/TGS requests, decrypting replies and talking to the KDC all live
//! behind [`TicketExchange`]; everything in this crate only moves the results
//! around.

#[cfg(test)]
pub(crate) mod mock;

use crate::{
    ticket::EncData, Credential, Enctype, ExchangeError, Keyblock, Kirbi, Principal, Spn,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{fmt, str::FromStr};

const KDC_PORT: u16 = 88;

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KdcTarget {
    pub host: String,
    pub port: u16,
}

impl KdcTarget {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_owned(),
            port: KDC_PORT,
        }
    }
}

impl FromStr for KdcTarget {
    type Err = String;

    /// `host` or `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.rsplit_once(':') {
            Some((host, port)) if !host.contains(':') => Ok(Self {
                host: host.to_owned(),
                port: port
                    .parse()
                    .map_err(|_| format!("{}: invalid KDC port", s))?,
            }),
            _ if s.is_empty() => Err("empty KDC address".to_owned()),
            _ => Ok(Self::new(s)),
        }
    }
}

impl fmt::Display for KdcTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Long term secret used for a fresh logon.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    NtHash([u8; 16]),
    Key(Keyblock),
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(..)"),
            Self::NtHash(_) => f.write_str("NtHash(..)"),
            Self::Key(key) => write!(f, "Key({})", key.enctype),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KerberosCredential {
    pub user: Spn,
    pub secret: Secret,
}

/// A TGT and its session key, bound to the KDC it will be presented to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TgtSession {
    pub target: KdcTarget,
    pub client: Principal,
    pub ticket: Vec<u8>,
    pub key: Keyblock,
}

impl TgtSession {
    pub fn from_credential(target: &KdcTarget, credential: &Credential) -> Self {
        Self {
            target: target.clone(),
            client: credential.client.clone(),
            ticket: credential.ticket.clone(),
            key: credential.keyblock.clone(),
        }
    }
}

/// The decrypted part of an AS or TGS reply, as far as ticket storage needs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncRepPart {
    pub flags: u32,
    pub authtime: DateTime<Utc>,
    pub starttime: Option<DateTime<Utc>>,
    pub endtime: DateTime<Utc>,
    pub renew_till: Option<DateTime<Utc>>,
    pub server: Principal,
}

/// Output of one successful exchange: `(ticket, enc_part, key)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReply {
    pub ticket: Vec<u8>,
    pub client: Principal,
    pub session_key: Keyblock,
    pub enc_part: EncRepPart,
}

impl ExchangeReply {
    pub fn to_kirbi(&self) -> Kirbi {
        Kirbi::from_exchange_result(
            &self.ticket,
            &self.client,
            &self.session_key,
            &self.enc_part,
        )
    }

    pub fn session(&self, target: &KdcTarget) -> TgtSession {
        TgtSession {
            target: target.clone(),
            client: self.client.clone(),
            ticket: self.ticket.clone(),
            key: self.session_key.clone(),
        }
    }
}

/// Answer to an AS-REQ sent without pre-authentication data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreauthReply {
    /// The KDC answered with an AS-REP; its enc-part is crackable.
    NotRequired { realm: String, enc_part: EncData },
    Required,
}

#[async_trait]
pub trait TicketExchange: Send + Sync {
    /// AS exchange with the user's long term secret.
    async fn get_tgt(
        &self,
        credential: &KerberosCredential,
        target: &KdcTarget,
    ) -> ExchangeResult<ExchangeReply>;

    /// TGS exchange for `spn`, offering `etypes` in order.
    async fn get_tgs(
        &self,
        session: &TgtSession,
        spn: &Spn,
        etypes: &[Enctype],
    ) -> ExchangeResult<ExchangeReply>;

    /// S4U2self followed by S4U2proxy: a ticket for `service` in the name of
    /// `target_user`.
    async fn get_service_ticket_for(
        &self,
        session: &TgtSession,
        target_user: &Spn,
        service: &Spn,
    ) -> ExchangeResult<ExchangeReply>;

    async fn get_tgt_without_preauth(
        &self,
        target: &KdcTarget,
        user: &Spn,
        etype: Enctype,
    ) -> ExchangeResult<PreauthReply>;

    /// Whether the KDC knows `user`, judged from its answer to an AS-REQ.
    async fn probe_user(&self, target: &KdcTarget, user: &Spn) -> ExchangeResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kdc_target_parsing() {
        assert_eq!("dc01".parse::<KdcTarget>().unwrap(), KdcTarget::new("dc01"));
        let target: KdcTarget = "10.0.0.1:8888".parse().unwrap();
        assert_eq!(target.port, 8888);
        assert_eq!(target.to_string(), "10.0.0.1:8888");
        assert!("dc01:http".parse::<KdcTarget>().is_err());
        assert!("".parse::<KdcTarget>().is_err());
    }

    #[test]
    fn secrets_stay_out_of_logs() {
        let secret = Secret::Password("hunter2".to_owned());
        assert!(!format!("{:?}", secret).contains("hunter2"));
    }
}

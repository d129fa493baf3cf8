//! Single ticket interchange files (`.kirbi`): an unencrypted `KRB-CRED`.
//!
//! ```text
//! KRB-CRED        ::= [APPLICATION 22] SEQUENCE {
//!         pvno            [0] INTEGER (5),
//!         msg-type        [1] INTEGER (22),
//!         tickets         [2] SEQUENCE OF Ticket,
//!         enc-part        [3] EncryptedData -- EncKrbCredPart
//! }
//!
//! EncKrbCredPart  ::= [APPLICATION 29] SEQUENCE {
//!         ticket-info     [0] SEQUENCE OF KrbCredInfo,
//!         ...
//! }
//! ```
//!
//! The enc-part is "encrypted" with etype 0, so the cipher is the plain DER of
//! the `EncKrbCredPart`. Ticket bytes are carried verbatim in both directions.

use crate::{
    credential_cache::{timestamp, Address, TicketTimes},
    exchange::EncRepPart,
    ticket::{parse_asn1_ticket, principal_from_asn1, principal_name_to_asn1, realm_to_asn1},
    Credential, Enctype, Error, Keyblock, Principal, Result,
};
use chrono::{DateTime, TimeZone, Utc};
use kerberos_asn1::{
    Asn1Object, EncKrbCredPart, EncryptedData, EncryptionKey, HostAddress, KerberosTime, KrbCred,
    KrbCredInfo, PrincipalName, Ticket,
};
use kerberos_constants::{etypes::NO_ENCRYPTION, message_types::KRB_CRED, protocol_version::PVNO};
use std::{fs, path::Path};
use tracing::debug;

const WHAT: &str = "kirbi";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kirbi {
    /// DER of the `Ticket`, exactly as the KDC issued it.
    pub ticket: Vec<u8>,
    pub info: CredInfo,
}

/// `KrbCredInfo`: everything the ticket holder knows about the ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredInfo {
    pub key: Keyblock,
    pub client: Option<Principal>,
    pub flags: Option<u32>,
    pub authtime: Option<DateTime<Utc>>,
    pub starttime: Option<DateTime<Utc>>,
    pub endtime: Option<DateTime<Utc>>,
    pub renew_till: Option<DateTime<Utc>>,
    pub server: Option<Principal>,
    pub caddr: Option<Vec<Address>>,
}

fn malformed(err: impl std::fmt::Debug) -> Error {
    Error::malformed(WHAT, format!("{:?}", err))
}

impl Kirbi {
    pub fn parse(data: &[u8]) -> Result<Self> {
        let (rest, krb_cred) = KrbCred::parse(data).map_err(malformed)?;
        if !rest.is_empty() {
            return Err(Error::malformed(
                WHAT,
                format!("{} trailing bytes after the DER element", rest.len()),
            ));
        }
        if krb_cred.pvno != PVNO {
            return Err(Error::malformed(WHAT, format!("pvno {}", krb_cred.pvno)));
        }
        if krb_cred.msg_type != KRB_CRED {
            return Err(Error::malformed(
                WHAT,
                format!("msg-type {} is not KRB-CRED", krb_cred.msg_type),
            ));
        }
        let ticket = match krb_cred.tickets.as_slice() {
            [] => return Err(Error::malformed(WHAT, "no ticket")),
            [ticket] => ticket.build(),
            tickets => {
                return Err(Error::UnsupportedMultiTicket {
                    count: tickets.len(),
                })
            }
        };

        let enc_part = &krb_cred.enc_part;
        if enc_part.etype != NO_ENCRYPTION {
            return Err(Error::malformed(
                WHAT,
                format!("enc-part is encrypted with {}", Enctype(enc_part.etype)),
            ));
        }
        let (_, cred_part) = EncKrbCredPart::parse(&enc_part.cipher).map_err(malformed)?;
        let info = match cred_part.ticket_info.as_slice() {
            [] => return Err(Error::malformed(WHAT, "no ticket-info")),
            [info] => CredInfo::from(info),
            infos => return Err(Error::UnsupportedMultiTicket { count: infos.len() }),
        };
        Ok(Self { ticket, info })
    }

    /// Fails when the ticket blob is not a DER `Ticket`, as is the case for
    /// the value of a cache configuration entry.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let ticket = parse_asn1_ticket(&self.ticket)?;
        if ticket.build() != self.ticket {
            return Err(Error::malformed("ticket", "not in canonical DER"));
        }
        Ok(krb_cred(vec![ticket], &self.info).build())
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|err| Error::io(path, err))?;
        Self::parse(&data).map_err(|err| err.in_file(path))
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = self.to_bytes().map_err(|err| err.in_file(path))?;
        fs::write(path, data).map_err(|err| Error::io(path, err))?;
        debug!(path = %path.display(), "wrote kirbi");
        Ok(())
    }

    /// Packs the result of one ticket exchange; no decryption happens here.
    pub fn from_exchange_result(
        ticket: &[u8],
        client: &Principal,
        session_key: &Keyblock,
        enc_part: &EncRepPart,
    ) -> Self {
        Self {
            ticket: ticket.to_owned(),
            info: CredInfo {
                key: session_key.clone(),
                client: Some(client.clone()),
                flags: Some(enc_part.flags),
                authtime: Some(enc_part.authtime),
                starttime: enc_part.starttime,
                endtime: Some(enc_part.endtime),
                renew_till: enc_part.renew_till,
                server: Some(enc_part.server.clone()),
                caddr: None,
            },
        }
    }

    pub fn to_credential(&self) -> Credential {
        let info = &self.info;
        let seconds = |time: Option<DateTime<Utc>>| {
            time.and_then(|time| u32::try_from(time.timestamp()).ok())
                .unwrap_or(0)
        };
        Credential {
            client: info.client.clone().unwrap_or_default(),
            server: info.server.clone().unwrap_or_default(),
            keyblock: info.key.clone(),
            times: TicketTimes {
                authtime: seconds(info.authtime),
                starttime: seconds(info.starttime),
                endtime: seconds(info.endtime),
                renew_till: seconds(info.renew_till),
            },
            is_skey: false,
            ticket_flags: info.flags.unwrap_or(0) as i32,
            addresses: info.caddr.clone().unwrap_or_default(),
            authdata: vec![],
            ticket: self.ticket.clone(),
            second_ticket: vec![],
        }
    }

    pub fn from_credential(credential: &Credential) -> Self {
        let times = &credential.times;
        Self {
            ticket: credential.ticket.clone(),
            info: CredInfo {
                key: credential.keyblock.clone(),
                client: Some(credential.client.clone()),
                flags: Some(credential.ticket_flags as u32),
                authtime: timestamp(times.authtime),
                starttime: timestamp(times.starttime),
                endtime: timestamp(times.endtime),
                renew_till: timestamp(times.renew_till),
                server: Some(credential.server.clone()),
                caddr: Some(credential.addresses.clone()).filter(|caddr| !caddr.is_empty()),
            },
        }
    }

    /// `<client>@<service>_<endtime>.kirbi`, safe to use as a file name.
    pub fn file_name(&self) -> String {
        let principal_name = |principal: &Option<Principal>| {
            principal
                .as_ref()
                .map(Principal::name)
                .unwrap_or_else(|| "unknown".to_owned())
        };
        let endtime = self
            .info
            .endtime
            .map(|time| time.format("%Y%m%d%H%M%S").to_string())
            .unwrap_or_else(|| "0".to_owned());
        let name = format!(
            "{}@{}_{}",
            principal_name(&self.info.client),
            principal_name(&self.info.server),
            endtime
        );
        format!("{}.kirbi", sanitize_file_name(&name))
    }
}

pub(crate) fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' | '@' => c,
            _ => '_',
        })
        .collect()
}

fn krb_cred(tickets: Vec<Ticket>, info: &CredInfo) -> KrbCred {
    let mut cred_part = EncKrbCredPart::default();
    cred_part.ticket_info.push(KrbCredInfo::from(info));
    let mut krb_cred = KrbCred::default();
    krb_cred.tickets = tickets;
    krb_cred.enc_part = EncryptedData::new(NO_ENCRYPTION, None, cred_part.build());
    krb_cred
}

fn kerberos_time(time: &KerberosTime) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(time.timestamp(), 0).single()
}

// KrbCredInfo     ::= SEQUENCE {
//         key             [0] EncryptionKey,
//         prealm          [1] Realm OPTIONAL,
//         pname           [2] PrincipalName OPTIONAL,
//         flags           [3] TicketFlags OPTIONAL,
//         authtime        [4] KerberosTime OPTIONAL,
//         starttime       [5] KerberosTime OPTIONAL,
//         endtime         [6] KerberosTime OPTIONAL,
//         renew-till      [7] KerberosTime OPTIONAL,
//         srealm          [8] Realm OPTIONAL,
//         sname           [9] PrincipalName OPTIONAL,
//         caddr           [10] HostAddresses OPTIONAL
// }
impl From<&KrbCredInfo> for CredInfo {
    fn from(info: &KrbCredInfo) -> Self {
        let principal = |realm: &Option<String>, name: &Option<PrincipalName>| match (realm, name) {
            (None, None) => None,
            (realm, Some(name)) => Some(principal_from_asn1(realm.as_ref(), name)),
            (Some(realm), None) => Some(Principal {
                realm: realm.as_bytes().to_owned(),
                ..Principal::default()
            }),
        };
        Self {
            key: Keyblock::new(Enctype(info.key.keytype), info.key.keyvalue.clone()),
            client: principal(&info.prealm, &info.pname),
            flags: info.flags.as_ref().map(|flags| flags.flags),
            authtime: info.authtime.as_ref().and_then(kerberos_time),
            starttime: info.starttime.as_ref().and_then(kerberos_time),
            endtime: info.endtime.as_ref().and_then(kerberos_time),
            renew_till: info.renew_till.as_ref().and_then(kerberos_time),
            server: principal(&info.srealm, &info.sname),
            caddr: info.caddr.as_ref().map(|caddr| {
                caddr
                    .iter()
                    .map(|address| Address {
                        addrtype: address.addr_type as u16,
                        contents: address.address.clone(),
                    })
                    .collect()
            }),
        }
    }
}

impl From<&CredInfo> for KrbCredInfo {
    fn from(info: &CredInfo) -> Self {
        let time = |time: Option<DateTime<Utc>>| time.map(KerberosTime::from);
        Self {
            key: EncryptionKey {
                keytype: info.key.enctype.0,
                keyvalue: info.key.contents.clone(),
            },
            prealm: info.client.as_ref().map(realm_to_asn1),
            pname: info.client.as_ref().map(principal_name_to_asn1),
            flags: info.flags.map(Into::into),
            authtime: time(info.authtime),
            starttime: time(info.starttime),
            endtime: time(info.endtime),
            renew_till: time(info.renew_till),
            srealm: info.server.as_ref().map(realm_to_asn1),
            sname: info.server.as_ref().map(principal_name_to_asn1),
            caddr: info.caddr.as_ref().map(|caddr| {
                caddr
                    .iter()
                    .map(|address| HostAddress {
                        addr_type: address.addrtype.into(),
                        address: address.contents.clone(),
                    })
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ticket::{self, EncData},
        NameType,
    };

    fn ticket_blob() -> Vec<u8> {
        ticket::Ticket::new(
            Principal::tgs("CORP.LOCAL"),
            EncData {
                enctype: Enctype::AES256_CTS_HMAC_SHA1_96,
                kvno: Some(2),
                ciphertext: (0..=255).collect(),
            },
        )
        .encode()
    }

    fn sample() -> Kirbi {
        Kirbi {
            ticket: ticket_blob(),
            info: CredInfo {
                key: Keyblock::new(Enctype::AES256_CTS_HMAC_SHA1_96, vec![0x5a; 32]),
                client: Some(Principal::new(NameType::PRINCIPAL, &["alice"], "CORP.LOCAL")),
                flags: Some(0x40e10000),
                authtime: Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
                starttime: Some(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap()),
                endtime: Some(Utc.with_ymd_and_hms(2024, 3, 1, 18, 0, 0).unwrap()),
                renew_till: Some(Utc.with_ymd_and_hms(2024, 3, 8, 8, 0, 0).unwrap()),
                server: Some(Principal::tgs("CORP.LOCAL")),
                caddr: Some(vec![Address {
                    addrtype: Address::ADDRTYPE_INET,
                    contents: vec![192, 168, 1, 10],
                }]),
            },
        }
    }

    #[test]
    fn parse_serialized() {
        let kirbi = sample();
        let bytes = kirbi.to_bytes().unwrap();
        assert_eq!(bytes[0], 0x76);
        let parsed = Kirbi::parse(&bytes).unwrap();
        assert_eq!(parsed, kirbi);
        assert_eq!(parsed.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn optional_info_fields() {
        let mut kirbi = sample();
        kirbi.info.flags = None;
        kirbi.info.starttime = None;
        kirbi.info.renew_till = None;
        kirbi.info.caddr = None;
        assert_eq!(Kirbi::parse(&kirbi.to_bytes().unwrap()).unwrap(), kirbi);
    }

    #[test]
    fn credential_conversion_keeps_ticket_and_key() {
        let kirbi = sample();
        let credential = kirbi.to_credential();
        assert_eq!(credential.ticket, kirbi.ticket);
        assert_eq!(credential.keyblock, kirbi.info.key);
        assert_eq!(credential.ticket_flags, 0x40e10000);
        assert_eq!(Kirbi::from_credential(&credential), kirbi);
        assert_eq!(Kirbi::from_credential(&credential).to_credential(), credential);
    }

    #[test]
    fn multiple_tickets_are_rejected() {
        let kirbi = sample();
        let ticket = parse_asn1_ticket(&kirbi.ticket).unwrap();
        let bytes = krb_cred(vec![ticket.clone(), ticket], &kirbi.info).build();
        assert!(matches!(
            Kirbi::parse(&bytes),
            Err(Error::UnsupportedMultiTicket { count: 2 })
        ));
        let bytes = krb_cred(vec![], &kirbi.info).build();
        assert!(matches!(Kirbi::parse(&bytes), Err(Error::MalformedFormat { .. })));
    }

    #[test]
    fn wrong_message_type_is_malformed() {
        let kirbi = sample();
        let bytes = kirbi.to_bytes().unwrap();
        // A ticket is not a KRB-CRED.
        assert!(matches!(
            Kirbi::parse(&ticket_blob()),
            Err(Error::MalformedFormat { .. })
        ));
        assert!(matches!(
            Kirbi::parse(&bytes[..bytes.len() - 1]),
            Err(Error::MalformedFormat { .. })
        ));

        let ticket = parse_asn1_ticket(&kirbi.ticket).unwrap();
        let mut krb_cred = krb_cred(vec![ticket], &kirbi.info);
        krb_cred.msg_type = 30;
        assert!(matches!(
            Kirbi::parse(&krb_cred.build()),
            Err(Error::MalformedFormat { .. })
        ));
    }

    #[test]
    fn only_ticket_blobs_serialize() {
        let mut kirbi = sample();
        kirbi.ticket = b"2".to_vec();
        assert!(matches!(kirbi.to_bytes(), Err(Error::MalformedFormat { .. })));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.kirbi");
        assert!(kirbi.to_file(&path).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn file_name_is_sanitized() {
        assert_eq!(
            sample().file_name(),
            "alice@krbtgt_CORP.LOCAL_20240301180000.kirbi"
        );
    }
}

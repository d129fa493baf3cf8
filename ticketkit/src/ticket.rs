use crate::{Enctype, Error, Kvno, NameType, Principal, Result};
use kerberos_asn1::{self as asn1, Asn1Object};
use kerberos_constants::protocol_version::PVNO;

/// The unencrypted view of a `Ticket`:
///
/// ```text
/// Ticket ::= [APPLICATION 1] SEQUENCE {
///         tkt-vno         [0] INTEGER (5),
///         realm           [1] Realm,
///         sname           [2] PrincipalName,
///         enc-part        [3] EncryptedData
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub server: Principal,
    pub enc_part: EncData,
}

impl Ticket {
    pub fn new(server: Principal, enc_part: EncData) -> Self {
        Self { server, enc_part }
    }

    pub fn decode_from(data: &[u8]) -> Result<Self> {
        Ok(Self::from(&parse_asn1_ticket(data)?))
    }

    pub fn encode(&self) -> Vec<u8> {
        asn1::Ticket::from(self).build()
    }
}

/// Parses the DER of one `Ticket`, rejecting trailing bytes and other versions.
pub(crate) fn parse_asn1_ticket(data: &[u8]) -> Result<asn1::Ticket> {
    const WHAT: &str = "ticket";
    let (rest, ticket) =
        asn1::Ticket::parse(data).map_err(|err| Error::malformed(WHAT, format!("{:?}", err)))?;
    if !rest.is_empty() {
        return Err(Error::malformed(
            WHAT,
            format!("{} trailing bytes after the DER element", rest.len()),
        ));
    }
    if ticket.tkt_vno != PVNO {
        return Err(Error::malformed(WHAT, format!("tkt-vno {}", ticket.tkt_vno)));
    }
    Ok(ticket)
}

impl From<&asn1::Ticket> for Ticket {
    fn from(ticket: &asn1::Ticket) -> Self {
        Self {
            server: principal_from_asn1(Some(&ticket.realm), &ticket.sname),
            enc_part: EncData::from(&ticket.enc_part),
        }
    }
}

impl From<&Ticket> for asn1::Ticket {
    fn from(ticket: &Ticket) -> Self {
        Self {
            tkt_vno: PVNO,
            realm: realm_to_asn1(&ticket.server),
            sname: principal_name_to_asn1(&ticket.server),
            enc_part: asn1::EncryptedData::from(&ticket.enc_part),
        }
    }
}

/// ```text
/// EncryptedData   ::= SEQUENCE {
///         etype   [0] Int32,
///         kvno    [1] UInt32 OPTIONAL,
///         cipher  [2] OCTET STRING
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncData {
    pub enctype: Enctype,
    pub kvno: Option<Kvno>,
    pub ciphertext: Vec<u8>,
}

impl From<&asn1::EncryptedData> for EncData {
    fn from(data: &asn1::EncryptedData) -> Self {
        Self {
            enctype: Enctype(data.etype),
            kvno: data.kvno,
            ciphertext: data.cipher.clone(),
        }
    }
}

impl From<&EncData> for asn1::EncryptedData {
    fn from(data: &EncData) -> Self {
        Self::new(data.enctype.0, data.kvno, data.ciphertext.clone())
    }
}

// Realm and KerberosString are GeneralString, carried as `String` by the
// codec; bytes that are not UTF-8 are replaced on the way out.
pub(crate) fn realm_to_asn1(principal: &Principal) -> asn1::Realm {
    String::from_utf8_lossy(&principal.realm).into_owned()
}

pub(crate) fn principal_name_to_asn1(principal: &Principal) -> asn1::PrincipalName {
    asn1::PrincipalName {
        name_type: principal.name_type.0,
        name_string: principal
            .components
            .iter()
            .map(|component| String::from_utf8_lossy(component).into_owned())
            .collect(),
    }
}

pub(crate) fn principal_from_asn1(
    realm: Option<&asn1::Realm>,
    name: &asn1::PrincipalName,
) -> Principal {
    Principal {
        realm: realm.map(|realm| realm.as_bytes().to_owned()).unwrap_or_default(),
        components: name
            .name_string
            .iter()
            .map(|component| component.as_bytes().to_owned())
            .collect(),
        name_type: NameType(name.name_type),
    }
}

use crate::{Flags, Keyblock, Principal, Result, Ticket, Timestamp};

const CONF_REALM: &str = "X-CACHECONF:";
const CONF_NAME: &str = "krb5_ccache_conf_data";

type AddressType = u16;
type AuthDataType = u16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub client: Principal,
    pub server: Principal,
    pub keyblock: Keyblock,
    pub times: TicketTimes,
    pub is_skey: bool,
    pub ticket_flags: Flags,
    pub addresses: Vec<Address>,
    pub authdata: Vec<AuthData>,
    /// Raw DER of the `Ticket`, never re-encoded.
    pub ticket: Vec<u8>,
    pub second_ticket: Vec<u8>,
}

macro_rules! ticket_flag {
    ($name:ident, $value:expr) => {
        pub const $name: Flags = $value;
    };
}

impl Credential {
    ticket_flag!(TKT_FLG_FORWARDABLE, 0x40000000);
    ticket_flag!(TKT_FLG_FORWARDED, 0x20000000);
    ticket_flag!(TKT_FLG_PROXIABLE, 0x10000000);
    ticket_flag!(TKT_FLG_PROXY, 0x08000000);
    ticket_flag!(TKT_FLG_MAY_POSTDATE, 0x04000000);
    ticket_flag!(TKT_FLG_POSTDATED, 0x02000000);
    ticket_flag!(TKT_FLG_INVALID, 0x01000000);
    ticket_flag!(TKT_FLG_RENEWABLE, 0x00800000);
    ticket_flag!(TKT_FLG_INITIAL, 0x00400000);
    ticket_flag!(TKT_FLG_PRE_AUTH, 0x00200000);
    ticket_flag!(TKT_FLG_HW_AUTH, 0x00100000);
    ticket_flag!(TKT_FLG_TRANSIT_POLICY_CHECKED, 0x00080000);
    ticket_flag!(TKT_FLG_OK_AS_DELEGATE, 0x00040000);
    ticket_flag!(TKT_FLG_ENC_PA_REP, 0x00010000);
    ticket_flag!(TKT_FLG_ANONYMOUS, 0x00008000);

    /// MIT marks removed entries in place by zeroing endtime and saturating authtime.
    #[inline]
    pub fn is_removed(&self) -> bool {
        self.times.endtime == 0 && self.times.authtime == u32::MAX
    }

    // Configuration entries are encoded as credential entries. The server
    // principal has the realm X-CACHECONF: and two or three components, the
    // first of which is krb5_ccache_conf_data. The configuration value is
    // stored in the ticket field of the entry.
    pub fn is_config(&self) -> bool {
        if self.server.realm != CONF_REALM.as_bytes() {
            return false;
        }
        self.server
            .components
            .first()
            .is_some_and(|component| component == CONF_NAME.as_bytes())
    }

    /// `(key, principal, value)` of a configuration entry.
    pub fn get_config(&self) -> Option<(&[u8], Option<&[u8]>, &[u8])> {
        if !self.is_config() {
            return None;
        }
        let components = &self.server.components;
        let key = components.get(1)?;
        let principal = components.get(2).map(Vec::as_slice);
        Some((key, principal, &self.ticket))
    }

    /// Whether the ticket field holds a ticket rather than a configuration value
    /// or a removed entry.
    pub fn holds_ticket(&self) -> bool {
        !self.is_removed() && !self.is_config()
    }

    /// A live ticket granting ticket, usable as a delegation candidate.
    pub fn is_tgt(&self) -> bool {
        self.holds_ticket() && self.server.is_tgs()
    }

    // The ticket field of a configuration entry is not (usually) a valid
    // encoding of a Kerberos ticket, so it is never decoded.
    pub fn get_ticket(&self) -> Result<Option<Ticket>> {
        if self.is_config() {
            return Ok(None);
        }
        Ticket::decode_from(&self.ticket).map(Some)
    }
}

/// Unix seconds; 0 means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TicketTimes {
    pub authtime: Timestamp,
    pub starttime: Timestamp,
    pub endtime: Timestamp,
    pub renew_till: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub addrtype: AddressType,
    pub contents: Vec<u8>,
}

macro_rules! address_type {
    ($name:ident, $value:expr) => {
        pub const $name: AddressType = $value;
    };
}

impl Address {
    address_type!(ADDRTYPE_INET, 0x0002);
    address_type!(ADDRTYPE_NETBIOS, 0x0014);
    address_type!(ADDRTYPE_INET6, 0x0018);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthData {
    pub ad_type: AuthDataType,
    pub contents: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Enctype, NameType};

    fn credential(server: Principal) -> Credential {
        Credential {
            client: Principal::new(NameType::PRINCIPAL, &["alice"], "CORP.LOCAL"),
            server,
            keyblock: Keyblock::new(Enctype::ARCFOUR_HMAC, vec![7; 16]),
            times: TicketTimes {
                authtime: 1_700_000_000,
                starttime: 1_700_000_000,
                endtime: 1_700_036_000,
                renew_till: 1_700_604_800,
            },
            is_skey: false,
            ticket_flags: Credential::TKT_FLG_FORWARDABLE | Credential::TKT_FLG_INITIAL,
            addresses: vec![],
            authdata: vec![],
            ticket: vec![],
            second_ticket: vec![],
        }
    }

    #[test]
    fn config_entries() {
        let mut server = Principal::new(
            NameType::PRINCIPAL,
            &[CONF_NAME, "pa_type", "krbtgt/CORP.LOCAL@CORP.LOCAL"],
            CONF_REALM,
        );
        let mut entry = credential(server.clone());
        entry.ticket = b"2".to_vec();
        assert!(entry.is_config());
        assert!(!entry.is_tgt());
        assert!(entry.get_ticket().unwrap().is_none());
        let (key, principal, value) = entry.get_config().unwrap();
        assert_eq!(key, b"pa_type");
        assert_eq!(principal, Some(&b"krbtgt/CORP.LOCAL@CORP.LOCAL"[..]));
        assert_eq!(value, b"2");

        server.realm = b"CORP.LOCAL".to_vec();
        assert!(!credential(server).is_config());
    }

    #[test]
    fn removed_entries_are_not_tgts() {
        let mut entry = credential(Principal::tgs("CORP.LOCAL"));
        assert!(entry.is_tgt());
        entry.times.endtime = 0;
        entry.times.authtime = u32::MAX;
        assert!(entry.is_removed());
        assert!(!entry.is_tgt());
    }
}

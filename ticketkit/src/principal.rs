use crate::{Error, Result};
use std::fmt;

const REALM_SEP: u8 = b'@';
const COMPONENT_SEP: u8 = b'/';
pub(crate) const KRB5_TGS_NAME: &str = "krbtgt";
const KRB5_WELLKNOWN_NAMESTR: &str = "WELLKNOWN";

/// A Kerberos principal as both file formats store it. Realm and components are
/// raw bytes, so names that are not valid UTF-8 survive a conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Principal {
    pub realm: Vec<u8>,
    pub components: Vec<Vec<u8>>,
    pub name_type: NameType,
}

impl Principal {
    pub fn new(name_type: NameType, components: &[&str], realm: &str) -> Self {
        Self {
            realm: realm.as_bytes().to_owned(),
            components: components
                .iter()
                .map(|c| c.as_bytes().to_owned())
                .collect(),
            name_type,
        }
    }

    /// `krbtgt/REALM@REALM`
    pub fn tgs(realm: &str) -> Self {
        Self::new(NameType::SRV_INST, &[KRB5_TGS_NAME, realm], realm)
    }

    /// Parses `comp1/comp2@REALM`. Without a realm in `name` the default one is
    /// used; without either, parsing fails.
    pub fn parse_name(name: &str, default_realm: Option<&str>) -> Result<Self> {
        if name.ends_with('\\') || name.is_empty() {
            return Err(Error::malformed("principal name", name));
        }
        let (components, realm) = match name.split_once('@') {
            None => (name, None),
            Some((components, realm)) => (components, Some(realm)),
        };
        let realm = match (realm, default_realm) {
            (Some(realm), _) if realm.contains('@') || realm.contains('/') => {
                return Err(Error::malformed("principal name", name))
            }
            (Some(realm), _) | (None, Some(realm)) => realm,
            (None, None) => {
                return Err(Error::MissingRealm {
                    target: name.to_owned(),
                })
            }
        };
        let components: Vec<Vec<u8>> = components
            .split('/')
            .map(|c| c.as_bytes().to_owned())
            .collect();
        let name_type = Self::infer_principal_type(&components);
        Ok(Principal {
            realm: realm.as_bytes().to_owned(),
            components,
            name_type,
        })
    }

    fn infer_principal_type(components: &[Vec<u8>]) -> NameType {
        if components.len() == 2 && components[0].eq(KRB5_TGS_NAME.as_bytes()) {
            NameType::SRV_INST
        } else if components.len() >= 2 && components[0].eq(KRB5_WELLKNOWN_NAMESTR.as_bytes()) {
            NameType::WELLKNOWN
        } else {
            NameType::PRINCIPAL
        }
    }

    /// `comp1/comp2`, without the realm.
    pub fn name(&self) -> String {
        let name = self.components.join(&COMPONENT_SEP);
        String::from_utf8_lossy(&name).into_owned()
    }

    pub fn realm(&self) -> String {
        String::from_utf8_lossy(&self.realm).into_owned()
    }

    pub fn unparse_name(&self) -> String {
        let name = [self.components.join(&COMPONENT_SEP), self.realm.clone()].join(&REALM_SEP);
        String::from_utf8_lossy(&name).into_owned()
    }

    /// Ticket granting service principal of any realm.
    pub fn is_tgs(&self) -> bool {
        self.components
            .first()
            .is_some_and(|first| first.eq_ignore_ascii_case(KRB5_TGS_NAME.as_bytes()))
    }

    pub fn is_empty(&self) -> bool {
        self.realm.is_empty() && self.components.is_empty()
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.unparse_name())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NameType(pub i32);

macro_rules! name_type {
    ($name_type:ident, $int:expr) => {
        pub const $name_type: NameType = NameType($int);
    };
}

impl NameType {
    // Name type not known
    name_type!(UNKNOWN, 0);
    // Just the name of the principal as in DCE, or for users
    name_type!(PRINCIPAL, 1);
    // Service and other unique instance (krbtgt)
    name_type!(SRV_INST, 2);
    // Service with host name as instance (telnet, rcommands)
    name_type!(SRV_HST, 3);
    // Service with host as remaining components
    name_type!(SRV_XHST, 4);
    // Unique ID
    name_type!(UID, 5);
    // PKINIT
    name_type!(X500_PRINCIPAL, 6);
    // Name in form of SMTP email name
    name_type!(SMTP_NAME, 7);
    // Windows 2000 UPN
    name_type!(ENTERPRISE_PRINCIPAL, 10);
    // Well-known (special) principal
    name_type!(WELLKNOWN, 11);
    // Windows 2000 UPN and SID
    name_type!(MS_PRINCIPAL, -128);
    // NT 4 style name
    name_type!(MS_PRINCIPAL_AND_ID, -129);
    // NT 4 style name and SID
    name_type!(ENT_PRINCIPAL_AND_ID, -130);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_unparse() {
        let principal = Principal::parse_name("cifs/fs01.corp.local@CORP.LOCAL", None).unwrap();
        assert_eq!(principal.components.len(), 2);
        assert_eq!(principal.realm(), "CORP.LOCAL");
        assert_eq!(principal.name_type, NameType::PRINCIPAL);
        assert_eq!(principal.unparse_name(), "cifs/fs01.corp.local@CORP.LOCAL");
        assert_eq!(principal.name(), "cifs/fs01.corp.local");
    }

    #[test]
    fn default_realm_applies_only_when_missing() {
        let principal = Principal::parse_name("alice", Some("CORP.LOCAL")).unwrap();
        assert_eq!(principal.to_string(), "alice@CORP.LOCAL");
        let principal = Principal::parse_name("alice@LAB", Some("CORP.LOCAL")).unwrap();
        assert_eq!(principal.realm(), "LAB");
        assert!(matches!(
            Principal::parse_name("alice", None),
            Err(Error::MissingRealm { .. })
        ));
    }

    #[test]
    fn tgs_detection() {
        let tgs = Principal::tgs("CORP.LOCAL");
        assert_eq!(tgs.name_type, NameType::SRV_INST);
        assert!(tgs.is_tgs());
        assert_eq!(
            Principal::parse_name("krbtgt/CORP.LOCAL@CORP.LOCAL", None)
                .unwrap()
                .name_type,
            NameType::SRV_INST
        );
        assert!(!Principal::new(NameType::PRINCIPAL, &["alice"], "CORP").is_tgs());
    }
}

use super::keytype::Keytype;
use std::{fmt, str::FromStr};

macro_rules! unsupported_enctype {
    ($enctype:ident, $name:expr) => {
        UnsupportedEnctype {
            enctype: Enctype::$enctype,
            name: $name,
        }
    };
}

const UNSUPPORTED_ENCTYPES: [UnsupportedEnctype; 5] = [
    unsupported_enctype!(DES_CBC_CRC, "des-cbc-crc"),
    unsupported_enctype!(DES_CBC_MD4, "des-cbc-md4"),
    unsupported_enctype!(DES_CBC_MD5, "des-cbc-md5"),
    unsupported_enctype!(DES_CBC_RAW, "des-cbc-raw"),
    unsupported_enctype!(DES_HMAC_SHA1, "des-hmac-sha1"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Enctype(pub i32);

macro_rules! enctype {
    ($enctype:ident, $int:expr) => {
        pub const $enctype: Enctype = Enctype($int);
    };
}

impl Enctype {
    enctype!(NULL, 0x0000);
    // @deprecated no longer supported
    enctype!(DES_CBC_CRC, 0x0001);
    // @deprecated no longer supported
    enctype!(DES_CBC_MD4, 0x0002);
    // @deprecated no longer supported
    enctype!(DES_CBC_MD5, 0x0003);
    // @deprecated no longer supported
    enctype!(DES_CBC_RAW, 0x0004);
    // @deprecated DES-3 cbc with SHA1
    enctype!(DES3_CBC_SHA, 0x0005);
    // @deprecated DES-3 cbc mode raw
    enctype!(DES3_CBC_RAW, 0x0006);
    // @deprecated no longer supported
    enctype!(DES_HMAC_SHA1, 0x0008);
    enctype!(DES3_CBC_SHA1, 0x0010);
    // RFC 3962
    enctype!(AES128_CTS_HMAC_SHA1_96, 0x0011);
    // RFC 3962
    enctype!(AES256_CTS_HMAC_SHA1_96, 0x0012);
    // RFC 8009
    enctype!(AES128_CTS_HMAC_SHA256_128, 0x0013);
    // RFC 8009
    enctype!(AES256_CTS_HMAC_SHA384_192, 0x0014);
    // RFC 4757
    enctype!(ARCFOUR_HMAC, 0x0017);
    // RFC 4757
    enctype!(ARCFOUR_HMAC_EXP, 0x0018);
    // RFC 6803
    enctype!(CAMELLIA128_CTS_CMAC, 0x0019);
    // RFC 6803
    enctype!(CAMELLIA256_CTS_CMAC, 0x001a);

    /// Legacy-to-modern preference list used when roasting without a pinned etype.
    pub const ROAST_PREFERENCE: [Enctype; 3] = [
        Self::ARCFOUR_HMAC,
        Self::AES128_CTS_HMAC_SHA1_96,
        Self::AES256_CTS_HMAC_SHA1_96,
    ];

    pub fn is_deprecated(self) -> bool {
        Keytype::find_enctype(self)
            .map(|keytype| keytype.is_deprecated())
            .unwrap_or(true)
    }

    /// AES etypes carry a trailing 12 byte HMAC, everything else a leading 16 byte checksum.
    pub fn is_aes_sha1(self) -> bool {
        self == Self::AES128_CTS_HMAC_SHA1_96 || self == Self::AES256_CTS_HMAC_SHA1_96
    }

    pub fn name(self, shortest: bool) -> Option<&'static str> {
        UnsupportedEnctype::find_name(self)
            .or_else(|| Keytype::find_enctype(self).map(|keytype| keytype.name(shortest)))
    }
}

impl fmt::Display for Enctype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name(true) {
            Some(name) => write!(f, "{}", name),
            None => write!(f, "etype-{}", self.0),
        }
    }
}

impl FromStr for Enctype {
    type Err = String;

    /// Accepts a number or any name or alias from the keytype table.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(value) = s.parse::<i32>() {
            return Ok(Self(value));
        }
        Keytype::find_name(s)
            .map(|keytype| keytype.enctype())
            .ok_or_else(|| format!("unknown encryption type: {}", s))
    }
}

struct UnsupportedEnctype {
    enctype: Enctype,
    name: &'static str,
}

impl UnsupportedEnctype {
    fn find_name(enctype: Enctype) -> Option<&'static str> {
        UNSUPPORTED_ENCTYPES
            .iter()
            .find(|e| e.enctype == enctype)
            .map(|e| e.name)
    }
}

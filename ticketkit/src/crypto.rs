mod enctype;
mod keytype;

pub use self::enctype::Enctype;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyblock {
    pub enctype: Enctype,
    pub contents: Vec<u8>,
}

impl Keyblock {
    pub fn new(enctype: Enctype, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            enctype,
            contents: contents.into(),
        }
    }
}

impl fmt::Display for Keyblock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.enctype, hex::encode(&self.contents))
    }
}

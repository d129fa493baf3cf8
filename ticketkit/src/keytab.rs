//! Read-only access to MIT `FILE:` keytabs, for listing their keys.

mod file_data;

pub use self::file_data::FileFormatVersion;
use crate::{
    credential_cache::timestamp, target::check_traversal, Error, Keyblock, Kvno, Principal, Result,
    Timestamp,
};
use chrono::{DateTime, Utc};
use std::{fs, path::Path};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeytabEntry {
    pub principal: Principal,
    pub timestamp: Timestamp,
    pub vno: Kvno,
    pub key: Keyblock,
}

impl KeytabEntry {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        timestamp(self.timestamp)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keytab {
    pub version: FileFormatVersion,
    pub entries: Vec<KeytabEntry>,
}

impl Keytab {
    pub fn parse(data: &[u8]) -> Result<Self> {
        file_data::parse(data)
    }

    /// Paths with a parent traversal are refused before the file is opened.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        check_traversal(&path.to_string_lossy())?;
        let data = fs::read(path).map_err(|err| Error::io(path, err))?;
        let keytab = Self::parse(&data).map_err(|err| err.in_file(path))?;
        debug!(path = %path.display(), entries = keytab.entries.len(), "loaded keytab");
        Ok(keytab)
    }
}

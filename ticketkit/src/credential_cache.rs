mod credential;
mod file_data;

pub use self::{
    credential::{Address, AuthData, Credential, TicketTimes},
    file_data::{FileFormatVersion, HeaderField},
};
use crate::{Conf, Context, Error, Kirbi, Principal, Result};
use chrono::{DateTime, TimeZone, Utc};
use std::{
    env, fs,
    path::{Path, PathBuf},
};
use tracing::debug;

const KRB5_ENV_CCNAME: &str = "KRB5CCNAME";
const DEFCCNAME: &str = "FILE:/tmp/krb5cc_%{uid}";
const FILE_PREFIX: &str = "FILE:";
const EDITED_SUFFIX: &str = ".edited.ccache";

/// An MIT `FILE:` credential cache held in memory.
///
/// Edits never touch `self`: [`delete_at`](Self::delete_at) and
/// [`with_kirbi`](Self::with_kirbi) return a new cache and persisting it is up
/// to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialCache {
    pub version: FileFormatVersion,
    pub headers: Vec<HeaderField>,
    pub principal: Principal,
    pub credentials: Vec<Credential>,
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new(Principal::default())
    }
}

impl CredentialCache {
    /// An empty version 4 cache with a zero KDC time offset.
    pub fn new(principal: Principal) -> Self {
        Self {
            version: FileFormatVersion::V4,
            headers: vec![HeaderField {
                tag: file_data::FCC_TAG_DELTATIME,
                value: vec![0; 8],
            }],
            principal,
            credentials: vec![],
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        file_data::parse(data)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        file_data::serialize(self)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|err| Error::io(path, err))?;
        let cache = Self::parse(&data).map_err(|err| err.in_file(path))?;
        debug!(
            path = %path.display(),
            version = cache.version as u8,
            credentials = cache.credentials.len(),
            "loaded credential cache"
        );
        Ok(cache)
    }

    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, self.to_bytes()).map_err(|err| Error::io(path, err))
    }

    /// Where an edit of the cache at `path` is written: next to it, with
    /// `.edited.ccache` appended to the file name.
    pub fn edited_path(path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let mut name = path.file_name().unwrap_or_default().to_os_string();
        name.push(EDITED_SUFFIX);
        path.with_file_name(name)
    }

    fn default_name(context: &Context) -> Result<String> {
        let name = match (&context.default_ccache_name, env::var(KRB5_ENV_CCNAME)) {
            (Some(name), _) => name.clone(),
            (None, Ok(name)) => name,
            (None, Err(_)) => context
                .profile
                .get_string(&Conf::key(Conf::LIBDEFAULTS, Conf::DEFAULT_CCACHE_NAME))
                .unwrap_or_else(|| DEFCCNAME.to_owned()),
        };
        Context::expand_path_tokens(&name)
    }

    /// Path of the default cache. Only the `FILE:` type can be resolved.
    pub fn default_path(context: &Context) -> Result<PathBuf> {
        let name = Self::default_name(context)?;
        let residual = match name.split_once(':') {
            None => name.as_str(),
            // A drive letter, not a cache type
            Some((prefix, _)) if prefix.len() == 1 => name.as_str(),
            Some(_) => name.strip_prefix(FILE_PREFIX).ok_or_else(|| {
                Error::Config(format!("{}: only FILE credential caches are supported", name))
            })?,
        };
        Ok(PathBuf::from(residual))
    }

    /// One display row per credential, in cache order.
    pub fn summaries(&self) -> Vec<Summary> {
        self.credentials
            .iter()
            .enumerate()
            .map(|(index, credential)| Summary::new(index, credential))
            .collect()
    }

    /// A copy of the cache without the credential at `index`.
    pub fn delete_at(&self, index: usize) -> Result<Self> {
        if index >= self.credentials.len() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.credentials.len(),
            });
        }
        let credentials = self
            .credentials
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, credential)| credential.clone())
            .collect();
        Ok(Self {
            version: self.version,
            headers: self.headers.clone(),
            principal: self.principal.clone(),
            credentials,
        })
    }

    /// A copy of the cache with `kirbi` appended. A cache without a default
    /// principal adopts the ticket's client.
    pub fn with_kirbi(&self, kirbi: &Kirbi) -> Self {
        let credential = kirbi.to_credential();
        let mut cache = self.clone();
        if cache.principal.is_empty() {
            cache.principal = credential.client.clone();
        }
        cache.credentials.push(credential);
        cache
    }

    /// One kirbi per ticket record with its index, in cache order.
    /// Configuration and removed entries hold no ticket and are left out.
    pub fn kirbis(&self) -> impl Iterator<Item = (usize, Kirbi)> + '_ {
        self.credentials
            .iter()
            .enumerate()
            .filter(|(_, credential)| credential.holds_ticket())
            .map(|(index, credential)| (index, Kirbi::from_credential(credential)))
    }

    /// Live ticket granting tickets with their index.
    pub fn tgts(&self) -> impl Iterator<Item = (usize, &Credential)> {
        self.credentials
            .iter()
            .enumerate()
            .filter(|(_, credential)| credential.is_tgt())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub index: usize,
    pub client: String,
    pub server: String,
    pub starttime: Option<DateTime<Utc>>,
    pub endtime: Option<DateTime<Utc>>,
    pub renew_till: Option<DateTime<Utc>>,
}

impl Summary {
    fn new(index: usize, credential: &Credential) -> Self {
        let times = &credential.times;
        // Without a starttime the ticket is valid from authtime.
        let starttime = match times.starttime {
            0 => times.authtime,
            starttime => starttime,
        };
        Self {
            index,
            client: credential.client.to_string(),
            server: credential.server.to_string(),
            starttime: timestamp(starttime),
            endtime: timestamp(times.endtime),
            renew_till: timestamp(times.renew_till),
        }
    }
}

pub(crate) fn timestamp(seconds: u32) -> Option<DateTime<Utc>> {
    match seconds {
        0 => None,
        seconds => Utc.timestamp_opt(seconds.into(), 0).single(),
    }
}

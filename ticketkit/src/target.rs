use crate::{Error, NameType, Principal, Result};
use std::{
    fmt,
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::debug;

const TRAVERSALS: [&str; 2] = ["../", "..\\"];

/// A roasting or delegation target: `username@domain`, where a username of
/// the form `class/host` names a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Spn {
    pub username: String,
    pub domain: String,
    pub service_class: Option<String>,
    pub service_name: Option<String>,
}

impl Spn {
    pub fn new(username: &str, domain: &str) -> Self {
        let (service_class, service_name) = match username.split_once('/') {
            Some((class, name)) => (Some(class.to_owned()), Some(name.to_owned())),
            None => (None, None),
        };
        Self {
            username: username.to_owned(),
            domain: domain.to_owned(),
            service_class,
            service_name,
        }
    }

    /// Parses one target line. Blank lines are not targets. A realm supplied
    /// by the caller replaces the one written in the line.
    pub fn resolve_one(line: &str, realm: Option<&str>) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let spn = match (line.split_once('@'), realm) {
            (Some((username, _)), Some(realm)) => Self::new(username, realm),
            (Some((username, domain)), None) => Self::new(username, domain),
            (None, Some(realm)) => Self::new(line, realm),
            (None, None) => {
                return Err(Error::MissingRealm {
                    target: line.to_owned(),
                })
            }
        };
        Ok(Some(spn))
    }

    /// `user@REALM`
    pub fn from_user_email(email: &str) -> Result<Self> {
        match email.trim().split_once('@') {
            Some((username, domain)) if !username.is_empty() && !domain.is_empty() => {
                Ok(Self::new(username, domain))
            }
            _ => Err(Error::MissingRealm {
                target: email.to_owned(),
            }),
        }
    }

    /// `class/host@REALM`
    pub fn from_target_string(target: &str) -> Result<Self> {
        let spn = Self::from_user_email(target)?;
        if spn.service_class.is_none() {
            return Err(Error::malformed(
                "service principal",
                format!("{}: expected class/host@realm", target),
            ));
        }
        Ok(spn)
    }

    pub fn is_service(&self) -> bool {
        self.service_class.is_some()
    }

    pub fn to_principal(&self) -> Principal {
        match (&self.service_class, &self.service_name) {
            (Some(class), Some(name)) => {
                Principal::new(NameType::SRV_INST, &[class.as_str(), name.as_str()], &self.domain)
            }
            _ => Principal::new(NameType::PRINCIPAL, &[self.username.as_str()], &self.domain),
        }
    }
}

impl fmt::Display for Spn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.domain)
    }
}

/// Where target lines come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSource {
    /// A list file when it can be opened for reading, otherwise a literal.
    Probe(String),
    File(PathBuf),
    Literal(String),
}

impl From<&str> for TargetSource {
    fn from(source: &str) -> Self {
        Self::Probe(source.to_owned())
    }
}

/// Resolves sources with the probing policy: each one is read as a
/// newline-delimited list if it opens as a file, else taken literally.
pub fn resolve_many<S: AsRef<str>>(sources: &[S], realm: Option<&str>) -> Result<Vec<Spn>> {
    let sources: Vec<TargetSource> = sources
        .iter()
        .map(|source| TargetSource::from(source.as_ref()))
        .collect();
    resolve_sources(&sources, realm)
}

/// Every path-like source is checked for traversal before any file is opened.
pub fn resolve_sources(sources: &[TargetSource], realm: Option<&str>) -> Result<Vec<Spn>> {
    for source in sources {
        match source {
            TargetSource::Probe(source) => check_traversal(source.trim())?,
            TargetSource::File(path) => check_traversal(&path.to_string_lossy())?,
            TargetSource::Literal(_) => {}
        }
    }
    let mut targets = vec![];
    for source in sources {
        match source {
            TargetSource::Probe(source) => {
                let source = source.trim();
                match open_list(Path::new(source)) {
                    Some(file) => {
                        debug!(source, "reading targets from file");
                        read_list(file, Path::new(source), realm, &mut targets)?
                    }
                    None => targets.extend(Spn::resolve_one(source, realm)?),
                }
            }
            TargetSource::File(path) => {
                let file = File::open(path).map_err(|err| Error::io(path, err))?;
                read_list(file, path, realm, &mut targets)?
            }
            TargetSource::Literal(line) => targets.extend(Spn::resolve_one(line, realm)?),
        }
    }
    Ok(targets)
}

/// Rejects `../` and `..\\` anywhere in a path taken from user input.
pub(crate) fn check_traversal(source: &str) -> Result<()> {
    if TRAVERSALS.iter().any(|traversal| source.contains(traversal)) {
        return Err(Error::UnsafePath {
            path: source.to_owned(),
        });
    }
    Ok(())
}

fn open_list(path: &Path) -> Option<File> {
    let file = File::open(path).ok()?;
    file.metadata().ok()?.is_file().then_some(file)
}

fn read_list(file: File, path: &Path, realm: Option<&str>, targets: &mut Vec<Spn>) -> Result<()> {
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|err| Error::io(path, err))?;
        targets.extend(Spn::resolve_one(&line, realm)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolve_inline_and_default_realm() {
        let expected = Spn::new("alice", "CORP.LOCAL");
        assert_eq!(Spn::resolve_one("alice@CORP.LOCAL", None).unwrap(), Some(expected.clone()));
        assert_eq!(Spn::resolve_one(" alice \n", Some("CORP.LOCAL")).unwrap(), Some(expected));
        assert!(matches!(
            Spn::resolve_one("alice", None),
            Err(Error::MissingRealm { .. })
        ));
        assert_eq!(Spn::resolve_one("   ", None).unwrap(), None);
    }

    #[test]
    fn caller_realm_wins() {
        let spn = Spn::resolve_one("alice@LAB", Some("CORP.LOCAL")).unwrap().unwrap();
        assert_eq!(spn.to_string(), "alice@CORP.LOCAL");
    }

    #[test]
    fn service_form() {
        let spn = Spn::from_target_string("MSSQLSvc/db01.corp.local:1433@CORP.LOCAL").unwrap();
        assert_eq!(spn.service_class.as_deref(), Some("MSSQLSvc"));
        assert_eq!(spn.service_name.as_deref(), Some("db01.corp.local:1433"));
        let principal = spn.to_principal();
        assert_eq!(principal.name_type, NameType::SRV_INST);
        assert_eq!(principal.to_string(), "MSSQLSvc/db01.corp.local:1433@CORP.LOCAL");
        assert!(Spn::from_target_string("alice@CORP.LOCAL").is_err());
        assert!(Spn::from_user_email("alice").is_err());
    }

    #[test]
    fn probe_reads_files_and_falls_back_to_literals() {
        let mut list = tempfile::NamedTempFile::new().unwrap();
        writeln!(list, "alice@CORP.LOCAL\n\nbob").unwrap();
        let path = list.path().to_str().unwrap().to_owned();
        let targets = resolve_many(&[path.as_str(), "carol"], Some("CORP.LOCAL")).unwrap();
        let names: Vec<String> = targets.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec!["alice@CORP.LOCAL", "bob@CORP.LOCAL", "carol@CORP.LOCAL"]
        );
    }

    #[test]
    fn explicit_literal_skips_probing() {
        let list = tempfile::NamedTempFile::new().unwrap();
        let path = list.path().to_str().unwrap().to_owned();
        let targets =
            resolve_sources(&[TargetSource::Literal(path.clone())], Some("CORP")).unwrap();
        assert_eq!(targets, vec![Spn::new(&path, "CORP")]);
    }

    #[test]
    fn traversal_is_rejected_before_access() {
        for source in ["../targets.txt", "..\\targets.txt", "lists/../../etc/passwd"] {
            assert!(matches!(
                resolve_many(&[source], Some("CORP")),
                Err(Error::UnsafePath { .. })
            ));
        }
        assert!(matches!(
            resolve_sources(&[TargetSource::File("../x".into())], None),
            Err(Error::UnsafePath { .. })
        ));
    }

    #[test]
    fn traversal_anywhere_fails_before_earlier_files_are_read() {
        let dir = tempfile::tempdir().unwrap();
        // A directory stands in for a list that would fail to read.
        let unreadable = dir.path().join("list.txt");
        std::fs::create_dir(&unreadable).unwrap();
        let sources = [
            TargetSource::File(unreadable),
            TargetSource::Probe("../targets.txt".to_owned()),
        ];
        assert!(matches!(
            resolve_sources(&sources, Some("CORP")),
            Err(Error::UnsafePath { .. })
        ));
    }
}

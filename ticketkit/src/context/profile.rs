use crate::{Error, Result};
use config::{Config, Environment, File, FileFormat, Map};
use std::env;
use tracing::{debug, warn};

const DEFAULT_PROFILE_PATH: &str = "/etc/krb5.conf";
const KRB5_ENV_CONFIG: &str = "KRB5_CONFIG";
const ENV_PREFIX: &str = "TICKETKIT";
/// Profile section that `TICKETKIT_*` variables override.
const ENV_SECTION: &str = "ticketkit.";

/// krb5.conf style INI files, first file wins, with `TICKETKIT_*`
/// environment variables layered over the `[ticketkit]` section.
#[derive(Debug)]
pub struct Profile {
    env: Config,
    files: Vec<ProfileFile>,
}

macro_rules! get_value {
    ($fn:ident, $type:ident) => {
        pub fn $fn(&self, key: &str) -> Option<$type> {
            if let Some(name) = key.strip_prefix(ENV_SECTION) {
                if let Ok(value) = self.env.$fn(name) {
                    return Some(value);
                }
            }
            for file in &self.files {
                if let Ok(value) = file.config.$fn(key) {
                    return Some(value);
                }
            }
            None
        }
    };
}

impl Profile {
    pub fn new() -> Result<Self> {
        Self::from_files(&Self::default_config_files(), None)
    }

    /// Reads `files` in order. Missing files are skipped; `env` replaces the
    /// process environment when given.
    pub fn from_files(files: &[String], env: Option<Map<String, String>>) -> Result<Self> {
        let env = Config::builder()
            .add_source(Environment::with_prefix(ENV_PREFIX).source(env))
            .build()
            .map_err(|err| Error::Config(err.to_string()))?;
        let files = files
            .iter()
            .filter_map(|filename| match ProfileFile::new(filename) {
                Ok(file) => Some(file),
                Err(err) => {
                    warn!(file = %filename, error = %err, "skipping unreadable profile");
                    None
                }
            })
            .collect();
        Ok(Self { env, files })
    }

    fn default_config_files() -> Vec<String> {
        let filepath = env::var(KRB5_ENV_CONFIG).unwrap_or(DEFAULT_PROFILE_PATH.to_owned());
        filepath
            .split(':')
            .filter(|f| !f.is_empty())
            .map(|f| f.to_owned())
            .collect()
    }

    get_value!(get_string, String);

    get_value!(get_int, i64);
}

#[derive(Debug)]
struct ProfileFile {
    config: Config,
}

impl ProfileFile {
    fn new(filename: &str) -> std::result::Result<Self, config::ConfigError> {
        let expanded_filename = match (filename.starts_with("~/"), env::var("HOME")) {
            (true, Ok(home_env)) => format!("{}{}", home_env, &filename[1..]),
            _ => filename.to_owned(),
        };
        let config = Config::builder()
            .add_source(
                File::with_name(&expanded_filename)
                    .format(FileFormat::Ini)
                    .required(false),
            )
            .build()?;
        debug!(file = %expanded_filename, "loaded profile");
        Ok(Self { config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn first_file_wins() {
        let mut first = tempfile::NamedTempFile::new().unwrap();
        first.write_all(b"[libdefaults]\ndefault_realm = FIRST\n").unwrap();
        let mut second = tempfile::NamedTempFile::new().unwrap();
        second
            .write_all(b"[libdefaults]\ndefault_realm = SECOND\ndefault_ccache_name = /tmp/cc\n")
            .unwrap();
        let profile = Profile::from_files(
            &[
                "/nonexistent/krb5.conf".to_owned(),
                first.path().to_string_lossy().into_owned(),
                second.path().to_string_lossy().into_owned(),
            ],
            Some(Map::new()),
        )
        .unwrap();
        assert_eq!(
            profile.get_string("libdefaults.default_realm").as_deref(),
            Some("FIRST")
        );
        assert_eq!(
            profile.get_string("libdefaults.default_ccache_name").as_deref(),
            Some("/tmp/cc")
        );
        assert_eq!(profile.get_int("libdefaults.default_realm"), None);
    }

    #[test]
    fn environment_only_reaches_its_section() {
        let mut env = Map::new();
        env.insert("TICKETKIT_DEFAULT_REALM".to_owned(), "ENV".to_owned());
        let profile = Profile::from_files(&[], Some(env)).unwrap();
        assert_eq!(profile.get_string("libdefaults.default_realm"), None);
        assert_eq!(
            profile.get_string("ticketkit.default_realm").as_deref(),
            Some("ENV")
        );
    }
}

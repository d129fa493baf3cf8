mod profile;

pub use self::profile::Profile;
use crate::{Enctype, Error, Result};
use nix::unistd::{Uid, User};
use std::env;
use tracing::debug;

const DEFAULT_ROAST_CONCURRENCY: usize = 8;
const DEFAULT_ASREPROAST_ETYPE: Enctype = Enctype::ARCFOUR_HMAC;
const DEFAULT_TEMP_DIR: &str = "/tmp";

pub struct Conf;

macro_rules! conf {
    ($name:ident, $value:expr) => {
        pub const $name: &'static str = $value;
    };
}

impl Conf {
    conf!(LIBDEFAULTS, "libdefaults");
    conf!(TICKETKIT, "ticketkit");

    conf!(ASREPROAST_ETYPE, "asreproast_etype");
    conf!(DEFAULT_CCACHE_NAME, "default_ccache_name");
    conf!(DEFAULT_REALM, "default_realm");
    conf!(ROAST_CONCURRENCY, "roast_concurrency");

    /// `section.name`, the key layout of an INI profile.
    pub fn key(section: &str, name: &str) -> String {
        format!("{}.{}", section, name)
    }
}

/// Settings shared by every operation, resolved once from the profile.
#[derive(Debug)]
pub struct Context {
    pub profile: Profile,
    pub default_realm: Option<String>,
    /// Set from the command line; takes precedence over `KRB5CCNAME`.
    pub default_ccache_name: Option<String>,
    pub roast_concurrency: usize,
    pub asreproast_etype: Enctype,
}

impl Context {
    pub fn init() -> Result<Self> {
        Self::with_profile(Profile::new()?)
    }

    pub fn with_profile(profile: Profile) -> Result<Self> {
        let default_realm = profile
            .get_string(&Conf::key(Conf::LIBDEFAULTS, Conf::DEFAULT_REALM))
            .filter(|realm| !realm.is_empty());

        let roast_concurrency = match profile
            .get_int(&Conf::key(Conf::TICKETKIT, Conf::ROAST_CONCURRENCY))
        {
            None => DEFAULT_ROAST_CONCURRENCY,
            Some(value) if value > 0 => value as usize,
            Some(value) => Err(Error::Config(format!(
                "{}: must be positive, got {}",
                Conf::ROAST_CONCURRENCY,
                value
            )))?,
        };

        let asreproast_etype = match profile
            .get_string(&Conf::key(Conf::TICKETKIT, Conf::ASREPROAST_ETYPE))
        {
            None => DEFAULT_ASREPROAST_ETYPE,
            Some(value) => value
                .parse()
                .map_err(|err| Error::Config(format!("{}: {}", Conf::ASREPROAST_ETYPE, err)))?,
        };

        debug!(
            ?default_realm,
            roast_concurrency,
            %asreproast_etype,
            "initialized context"
        );
        Ok(Self {
            profile,
            default_realm,
            default_ccache_name: None,
            roast_concurrency,
            asreproast_etype,
        })
    }

    pub fn set_default_ccname(&mut self, name: &str) {
        self.default_ccache_name = Some(name.to_owned())
    }

    /// Expands `%{token}` references in a profile path.
    pub fn expand_path_tokens(path: &str) -> Result<String> {
        let mut buf = String::with_capacity(path.len());
        let mut path_remained = path;
        while !path_remained.is_empty() {
            let token_begin = match path_remained.find("%{") {
                Some(token_begin) => {
                    buf.push_str(&path_remained[..token_begin]);
                    token_begin
                }
                None => {
                    buf.push_str(path_remained);
                    break;
                }
            };
            let token_end = match path_remained[token_begin..].find('}') {
                Some(token_end) => token_begin + token_end,
                None => Err(Error::Config(format!("{}: unterminated path token", path)))?,
            };
            let token_value = Self::expand_token(&path_remained[token_begin + 2..token_end])?;
            buf.push_str(&token_value);
            path_remained = &path_remained[token_end + 1..];
        }
        Ok(buf)
    }

    fn expand_token(token: &str) -> Result<String> {
        let token_value = match token {
            "euid" => Uid::effective().to_string(),
            "username" => User::from_uid(Uid::effective())
                .map_err(|err| Error::Config(format!("looking up the current user: {}", err)))?
                .map(|u| u.name)
                .unwrap_or_else(|| Uid::effective().to_string()),
            "uid" | "USERID" => Uid::current().to_string(),
            "TEMP" => env::var("TMPDIR").unwrap_or_else(|_| DEFAULT_TEMP_DIR.to_owned()),
            _ => Err(Error::Config(format!("unknown path token %{{{}}}", token)))?,
        };
        Ok(token_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn context(ini: &str, env: &[(&str, &str)]) -> Result<Context> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ini.as_bytes()).unwrap();
        let env = env
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Context::with_profile(Profile::from_files(
            &[file.path().to_string_lossy().into_owned()],
            Some(env),
        )?)
    }

    #[test]
    fn defaults_apply_without_settings() {
        let context = context("", &[]).unwrap();
        assert_eq!(context.default_realm, None);
        assert_eq!(context.roast_concurrency, 8);
        assert_eq!(context.asreproast_etype, Enctype::ARCFOUR_HMAC);
    }

    #[test]
    fn profile_settings_are_read() {
        let context = context(
            "[libdefaults]\ndefault_realm = CORP.LOCAL\n\n\
             [ticketkit]\nroast_concurrency = 3\nasreproast_etype = aes256-cts\n",
            &[],
        )
        .unwrap();
        assert_eq!(context.default_realm.as_deref(), Some("CORP.LOCAL"));
        assert_eq!(context.roast_concurrency, 3);
        assert_eq!(context.asreproast_etype, Enctype::AES256_CTS_HMAC_SHA1_96);
    }

    #[test]
    fn environment_overrides_profile() {
        let context = context(
            "[ticketkit]\nroast_concurrency = 3\n",
            &[("TICKETKIT_ROAST_CONCURRENCY", "16")],
        )
        .unwrap();
        assert_eq!(context.roast_concurrency, 16);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(matches!(
            context("[ticketkit]\nroast_concurrency = 0\n", &[]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            context("[ticketkit]\nasreproast_etype = rot13\n", &[]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn path_tokens() {
        let uid = Uid::current().to_string();
        assert_eq!(
            Context::expand_path_tokens("/tmp/krb5cc_%{uid}").unwrap(),
            format!("/tmp/krb5cc_{}", uid)
        );
        assert_eq!(Context::expand_path_tokens("plain").unwrap(), "plain");
        assert!(Context::expand_path_tokens("/tmp/%{uid").is_err());
        assert!(Context::expand_path_tokens("/tmp/%{nope}").is_err());
    }
}

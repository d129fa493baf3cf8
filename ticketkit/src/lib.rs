//! Kerberos ticket artifacts: MIT credential caches and keytabs, single ticket
//! `.kirbi` files, and the orchestration that fills them (delegation, roasting,
//! export of extracted tickets).

pub mod context;
pub mod credential_cache;
pub mod crypto;
pub mod delegation;
pub mod error;
pub mod exchange;
pub mod export;
pub mod keytab;
pub mod kirbi;
pub mod principal;
pub mod roast;
pub mod target;
pub mod ticket;

pub use context::{Conf, Context};
pub use credential_cache::{Credential, CredentialCache};
pub use crypto::{Enctype, Keyblock};
pub use error::{Error, ExchangeError, Result};
pub use keytab::Keytab;
pub use kirbi::Kirbi;
pub use principal::{NameType, Principal};
pub use target::Spn;
pub use ticket::Ticket;

use std::process::ExitCode;
use tracing::warn;

pub type Flags = i32;
pub type Kvno = u32;
type Timestamp = u32;

const EXIT_PARTIAL: u8 = 2;

/// How far a command got. Batch commands finish with `Partial` when some
/// targets failed and the rest were processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Full,
    Partial,
}

/// Exit status of a command: 0 when complete, 1 on a fatal error, 2 when a
/// batch finished with recorded failures.
pub fn exit_code(progname: &str, result: anyhow::Result<Completion>) -> ExitCode {
    match result {
        Ok(Completion::Full) => ExitCode::SUCCESS,
        Ok(Completion::Partial) => {
            warn!("finished with failures");
            ExitCode::from(EXIT_PARTIAL)
        }
        Err(err) => {
            eprintln!("{}: {:#}", progname, err);
            ExitCode::FAILURE
        }
    }
}

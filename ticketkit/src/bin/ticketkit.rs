use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand};
use once_cell::sync::Lazy;
use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};
use ticketkit::{
    credential_cache::Summary,
    exit_code,
    roast::{self, HashFormat},
    Completion, Context, CredentialCache, Enctype, Keytab, Kirbi,
};
use tracing::{debug, info, warn, Level};

const PROGNAME: &str = "ticketkit";
const KIRBI_EXTENSION: &str = "kirbi";

static ARGS: Lazy<Args> = Lazy::new(Args::parse);
static NOW: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

#[derive(Parser)]
#[command(name = PROGNAME, version)]
struct Args {
    /// increases log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// lists the credentials of a cache with their index
    List {
        /// credential cache (default: the configured default cache)
        #[arg(short = 'c')]
        ccache: Option<String>,
        /// includes configuration entries
        #[arg(short = 'C', default_value_t = false)]
        show_config: bool,
        /// shows the encryption types
        #[arg(short = 'e', default_value_t = false)]
        show_etype: bool,
    },
    /// removes one credential, writing the result next to the cache
    Del {
        #[arg(short = 'c')]
        ccache: Option<String>,
        index: usize,
    },
    /// prints crackable hashes of the service tickets in a cache
    Roast {
        #[arg(short = 'c')]
        ccache: Option<String>,
        /// appends hashes to this file instead of printing them
        #[arg(short = 'o')]
        output: Option<PathBuf>,
        /// hashcat or john
        #[arg(long, default_value = "hashcat")]
        format: HashFormat,
    },
    /// writes every credential of a cache to its own kirbi file
    #[command(name = "ccache2kirbi")]
    Ccache2kirbi {
        #[arg(short = 'c')]
        ccache: Option<String>,
        /// output directory
        #[arg(short = 'o', default_value = ".")]
        output: PathBuf,
    },
    /// lists the keys of a keytab file
    Keytab {
        keytab: PathBuf,
        /// shows keytab entry timestamps
        #[arg(short = 't', default_value_t = false)]
        show_time: bool,
        /// shows the encryption types
        #[arg(short = 'e', default_value_t = false)]
        show_etype: bool,
        /// shows keytab entry keys
        #[arg(short = 'K', default_value_t = false)]
        show_keys: bool,
    },
    /// adds kirbi files (or directories of them) to a cache, creating it if
    /// missing
    #[command(name = "kirbi2ccache")]
    Kirbi2ccache {
        #[arg(required = true)]
        kirbis: Vec<PathBuf>,
        /// target cache
        #[arg(short = 'o')]
        output: PathBuf,
    },
}

fn main() -> ExitCode {
    init_logging(ARGS.verbose);
    exit_code(PROGNAME, run())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> anyhow::Result<Completion> {
    // Forces the evaluation of lazy static value `NOW` to use current time
    let _ = *NOW;

    let mut context = Context::init().context("while initializing the profile")?;
    match &ARGS.command {
        Command::List {
            ccache,
            show_config,
            show_etype,
        } => {
            let path = resolve_ccache(&mut context, ccache.as_deref())?;
            list(&path, *show_config, *show_etype)
        }
        Command::Del { ccache, index } => {
            let path = resolve_ccache(&mut context, ccache.as_deref())?;
            delete(&path, *index)
        }
        Command::Roast {
            ccache,
            output,
            format,
        } => {
            let path = resolve_ccache(&mut context, ccache.as_deref())?;
            roast_ccache(&path, output.as_deref(), *format)
        }
        Command::Ccache2kirbi { ccache, output } => {
            let path = resolve_ccache(&mut context, ccache.as_deref())?;
            ccache_to_kirbi(&path, output)
        }
        Command::Keytab {
            keytab,
            show_time,
            show_etype,
            show_keys,
        } => list_keytab(keytab, *show_time, *show_etype, *show_keys),
        Command::Kirbi2ccache { kirbis, output } => kirbi_to_ccache(kirbis, output),
    }
}

fn resolve_ccache(context: &mut Context, name: Option<&str>) -> anyhow::Result<PathBuf> {
    if let Some(name) = name {
        context.set_default_ccname(name);
    }
    CredentialCache::default_path(context).context("while resolving ccache")
}

fn list(path: &Path, show_config: bool, show_etype: bool) -> anyhow::Result<Completion> {
    let cache = CredentialCache::from_file(path)?;
    println!("Ticket cache: FILE:{}", path.display());
    println!("Default principal: {}\n", cache.principal);
    println!(
        "{:>5}  {:<17}  {:<17}  Service principal",
        "Index", "Valid starting", "Expires"
    );
    let default_name = cache.principal.to_string();
    for (summary, credential) in cache.summaries().iter().zip(&cache.credentials) {
        if credential.is_config() && !show_config {
            continue;
        }
        print_summary(summary, &default_name);
        if show_etype {
            if let Some(ticket) = credential
                .get_ticket()
                .with_context(|| format!("while decoding ticket {}", summary.index))?
            {
                println!(
                    "\tEtype (skey, tkt): {}, {}",
                    etype_string(credential.keyblock.enctype),
                    etype_string(ticket.enc_part.enctype)
                );
            }
        }
    }
    Ok(Completion::Full)
}

fn print_summary(summary: &Summary, default_name: &str) {
    println!(
        "{:>5}  {:<17}  {:<17}  {}",
        summary.index,
        timestamp_string(summary.starttime),
        timestamp_string(summary.endtime),
        summary.server
    );
    let mut extra = vec![];
    if summary.client != default_name {
        extra.push(format!("for client {}", summary.client));
    }
    if let Some(renew_till) = summary.renew_till {
        extra.push(format!("renew until {}", timestamp_string(Some(renew_till))));
    }
    if summary.endtime.is_some_and(|endtime| endtime <= *NOW) {
        extra.push("(Expired)".to_owned());
    }
    if !extra.is_empty() {
        println!("\t{}", extra.join(", "));
    }
}

fn etype_string(enctype: Enctype) -> String {
    if enctype.is_deprecated() {
        format!("DEPRECATED:{}", enctype)
    } else {
        enctype.to_string()
    }
}

fn timestamp_string(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp
        .map(|timestamp| timestamp.format("%x %X").to_string())
        .unwrap_or_else(|| "-".to_owned())
}

fn delete(path: &Path, index: usize) -> anyhow::Result<Completion> {
    let cache = CredentialCache::from_file(path)?;
    let edited = cache
        .delete_at(index)
        .with_context(|| format!("while deleting from {}", path.display()))?;
    let edited_path = CredentialCache::edited_path(path);
    edited.to_file(&edited_path)?;
    info!(index, path = %edited_path.display(), "wrote edited cache");
    println!("{}", edited_path.display());
    Ok(Completion::Full)
}

fn roast_ccache(
    path: &Path,
    output: Option<&Path>,
    format: HashFormat,
) -> anyhow::Result<Completion> {
    let cache = CredentialCache::from_file(path)?;
    let outcome = roast::roast_cache(&cache, format);
    match output {
        Some(output) => roast::write_hashes(output, &outcome.hashes)?,
        None => outcome.hashes.iter().for_each(|hash| println!("{}", hash)),
    }
    for failure in &outcome.failures {
        warn!(source = %failure.source_identifier, reason = %failure.reason, "no hash");
    }
    Ok(completion(outcome.is_partial()))
}

fn ccache_to_kirbi(path: &Path, output: &Path) -> anyhow::Result<Completion> {
    let cache = CredentialCache::from_file(path)?;
    fs::create_dir_all(output).with_context(|| format!("{}", output.display()))?;
    for (index, credential) in cache.credentials.iter().enumerate() {
        if !credential.holds_ticket() {
            info!(index, server = %credential.server, "skipping entry without a ticket");
        }
    }
    for (index, kirbi) in cache.kirbis() {
        let kirbi_path = output.join(format!("{}_{}", index, kirbi.file_name()));
        kirbi.to_file(&kirbi_path)?;
        println!("{}", kirbi_path.display());
    }
    Ok(Completion::Full)
}

fn list_keytab(
    path: &Path,
    show_time: bool,
    show_etype: bool,
    show_keys: bool,
) -> anyhow::Result<Completion> {
    let keytab = Keytab::from_file(path)?;
    println!("Keytab name: FILE:{}", path.display());
    if show_time {
        println!("KVNO {:<17} Principal", "Timestamp");
        println!("{} {} {}", "-".repeat(4), "-".repeat(17), "-".repeat(56));
    } else {
        println!("KVNO Principal");
        println!("{} {}", "-".repeat(4), "-".repeat(74));
    }
    for entry in &keytab.entries {
        print!("{:>4} ", entry.vno);
        if show_time {
            print!("{:<17} ", timestamp_string(entry.timestamp()));
        }
        print!("{}", entry.principal);
        if show_etype {
            print!(" ({})", etype_string(entry.key.enctype));
        }
        if show_keys {
            print!(" (0x{})", hex::encode(&entry.key.contents));
        }
        println!();
    }
    Ok(Completion::Full)
}

fn kirbi_to_ccache(inputs: &[PathBuf], output: &Path) -> anyhow::Result<Completion> {
    let mut cache = match CredentialCache::from_file(output) {
        Ok(cache) => cache,
        Err(err) if err.is_not_found() => {
            debug!(path = %output.display(), "creating a new cache");
            CredentialCache::default()
        }
        Err(err) => return Err(err.into()),
    };
    let mut added = 0;
    for path in kirbi_files(inputs)? {
        let kirbi = Kirbi::from_file(&path)?;
        cache = cache.with_kirbi(&kirbi);
        added += 1;
    }
    cache.to_file(output)?;
    info!(added, path = %output.display(), "wrote cache");
    Ok(Completion::Full)
}

/// Expands directories to the kirbi files directly inside them.
fn kirbi_files(inputs: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = vec![];
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let mut entries = vec![];
        for entry in fs::read_dir(input).with_context(|| format!("{}", input.display()))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == KIRBI_EXTENSION) {
                entries.push(path);
            }
        }
        entries.sort();
        files.append(&mut entries);
    }
    Ok(files)
}

fn completion(partial: bool) -> Completion {
    if partial {
        Completion::Partial
    } else {
        Completion::Full
    }
}

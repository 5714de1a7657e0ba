//! tglfs: chunked file storage over a messaging channel
//!
//! Commands:
//!   store <path>                      - upload (or resume uploading) a file
//!   lookup [<term>] [--from <peer>]   - list stored files matching a term
//!   retrieve <fp> [<dest>] [--force]  - reassemble a file locally
//!   rename <fp> <name>                - change a file's display name
//!   delete <fp> [--from <peer>]       - delete a file (or unsend it from a peer)
//!   send <fp> <to>                    - forward a file to another conversation
//!   receive <fp> <from>               - forward a file from a peer into home
//!   config show                       - display current configuration

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use zeroize::Zeroizing;

use tglfs_archive::{Archive, ProgressFn};
use tglfs_channel::MailboxChannel;
use tglfs_chunks::ScratchDir;
use tglfs_core::config::{ChannelBackend, TglfsConfig};
use tglfs_core::{FileFingerprint, FileRecord};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tglfs",
    version,
    about = "Chunked file storage over a messaging channel",
    long_about = "tglfs: store, find, retrieve, rename, delete and share files kept as chunk messages"
)]
struct Cli {
    /// Path to tglfs.toml configuration file
    #[arg(long, short = 'c', env = "TGLFS_CONFIG", default_value = "~/.config/tglfs/tglfs.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "TGLFS_LOG")]
    log: Option<String>,

    /// Log format; overrides [log] format
    #[arg(long, env = "TGLFS_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Args, Debug, Default)]
struct PasswordArgs {
    /// Encryption password (empty or absent: chunks are stored in plaintext)
    #[arg(long, env = "TGLFS_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Prompt for the password without echoing it
    #[arg(long, conflicts_with = "password")]
    ask_password: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upload a file, resuming if some of its chunks are already stored
    Store {
        path: PathBuf,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// List stored files whose captions match a term (name fragment or fingerprint)
    Lookup {
        #[arg(default_value = "")]
        term: String,
        /// Look in a peer's conversation instead of home
        #[arg(long)]
        from: Option<String>,
    },

    /// Reassemble a stored file
    Retrieve {
        fingerprint: String,
        /// Destination path (default: the stored display name in the current directory)
        dest: Option<PathBuf>,
        /// Overwrite an existing destination
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        password: PasswordArgs,
    },

    /// Change the display name of a stored file
    Rename { fingerprint: String, name: String },

    /// Delete every chunk of a file
    Delete {
        fingerprint: String,
        /// Delete copies sent to a peer conversation ("unsend")
        #[arg(long)]
        from: Option<String>,
    },

    /// Forward a file to another conversation
    Send { fingerprint: String, to: String },

    /// Forward a file from a peer's conversation into home
    Receive { fingerprint: String, from: String },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = TglfsConfig::load(&config_path)
        .with_context(|| format!("loading config: {}", config_path.display()))?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = cli.log_format.clone().unwrap_or(if config.log.format == "json" {
        LogFormat::Json
    } else {
        LogFormat::Text
    });
    init_logging(&level, &format);
    if !config_path.exists() {
        tracing::warn!("config file not found: {}  (using defaults)", config_path.display());
    }

    match cli.command {
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &config_path),
        Commands::Store { path, password } => {
            let archive = open_archive(&config)?;
            cmd_store(&archive, &path, &password).await
        }
        Commands::Lookup { term, from } => {
            let archive = open_archive(&config)?;
            cmd_lookup(&archive, &term, from.as_deref()).await
        }
        Commands::Retrieve { fingerprint, dest, force, password } => {
            let archive = open_archive(&config)?;
            cmd_retrieve(&archive, &fingerprint, dest.as_deref(), force, &password).await
        }
        Commands::Rename { fingerprint, name } => {
            let archive = open_archive(&config)?;
            let fp = parse_fingerprint(&fingerprint)?;
            let n = archive
                .rename(&fp, &name)
                .await
                .with_context(|| format!("renaming {fp}"))?;
            println!("renamed {n} chunk(s) of {} → {name}", fp.short());
            Ok(())
        }
        Commands::Delete { fingerprint, from } => {
            let archive = open_archive(&config)?;
            let fp = parse_fingerprint(&fingerprint)?;
            let n = archive
                .delete(&fp, from.as_deref())
                .await
                .with_context(|| format!("deleting {fp}"))?;
            match (n, from) {
                (0, _) => println!("nothing to delete for {}", fp.short()),
                (n, Some(peer)) => println!("unsent {n} chunk(s) of {} from {peer}", fp.short()),
                (n, None) => println!("deleted {n} chunk(s) of {}", fp.short()),
            }
            Ok(())
        }
        Commands::Send { fingerprint, to } => {
            let archive = open_archive(&config)?;
            let fp = parse_fingerprint(&fingerprint)?;
            let n = archive
                .send(&fp, &to)
                .await
                .with_context(|| format!("sending {fp} to {to}"))?;
            println!("sent {n} chunk(s) of {} to {to}", fp.short());
            Ok(())
        }
        Commands::Receive { fingerprint, from } => {
            let archive = open_archive(&config)?;
            let fp = parse_fingerprint(&fingerprint)?;
            let n = archive
                .receive(&fp, &from)
                .await
                .with_context(|| format!("receiving {fp} from {from}"))?;
            println!("received {n} chunk(s) of {} from {from}", fp.short());
            Ok(())
        }
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Archive from config + environment credentials ─────────────────────────────

/// Open the mailbox named by `[channel]` and the scratch area.
///
/// For the s3 backend, reads AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
/// (standard S3 env vars).
fn open_archive(config: &TglfsConfig) -> Result<Archive> {
    let (access_key, secret_key) = if config.channel.backend == ChannelBackend::S3 {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID").context(
            "S3 credentials not set\n\
             Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
             Example:\n\
             \texport AWS_ACCESS_KEY_ID=your-key\n\
             \texport AWS_SECRET_ACCESS_KEY=your-secret",
        )?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        (access_key, secret_key)
    } else {
        (String::new(), String::new())
    };

    let root = expand_tilde(&config.channel.root);
    if config.channel.backend == ChannelBackend::Fs {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating mailbox root: {}", root.display()))?;
    }
    let op = tglfs_channel::build_from_config(&config.channel, &root, &access_key, &secret_key)
        .context("building mailbox operator")?;

    let scratch_dir = expand_tilde(&config.scratch.dir);
    let scratch = ScratchDir::new(&scratch_dir)
        .with_context(|| format!("creating scratch dir: {}", scratch_dir.display()))?;

    Ok(Archive::new(
        Arc::new(MailboxChannel::new(op)),
        config.clone(),
        scratch,
    ))
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(format!("{home}/{rest}"))
    } else {
        path.to_path_buf()
    }
}

fn parse_fingerprint(text: &str) -> Result<FileFingerprint> {
    text.trim()
        .parse()
        .with_context(|| format!("invalid fingerprint: {text}"))
}

fn read_password(args: &PasswordArgs, confirm: bool) -> Result<Option<SecretString>> {
    if args.ask_password {
        let first = Zeroizing::new(
            rpassword::prompt_password("Password: ").context("reading password")?,
        );
        if confirm {
            let second = Zeroizing::new(
                rpassword::prompt_password("Confirm password: ").context("reading password")?,
            );
            if *first != *second {
                anyhow::bail!("passwords do not match");
            }
        }
        if first.is_empty() {
            return Ok(None);
        }
        return Ok(Some(SecretString::from(first.as_str().to_owned())));
    }
    Ok(args
        .password
        .clone()
        .filter(|p| !p.is_empty())
        .map(SecretString::from))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str, template: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn progress_callback(pb: &ProgressBar) -> ProgressFn {
    let pb = pb.clone();
    Box::new(move |done, total, msg| {
        pb.set_length(total);
        pb.set_position(done);
        pb.set_message(msg.to_string());
    })
}

// ── `tglfs store` ─────────────────────────────────────────────────────────────

async fn cmd_store(archive: &Archive, path: &Path, password: &PasswordArgs) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("not a regular file: {}", path.display());
    }
    let password = read_password(password, true)?;

    let pb = make_progress_bar(
        0,
        "store",
        "{prefix:.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
    );
    let progress = progress_callback(&pb);
    let outcome = archive
        .store(path, password.as_ref(), Some(&progress))
        .await
        .with_context(|| format!("storing {}", path.display()))?;

    if outcome.uploaded == 0 {
        pb.finish_with_message("already stored");
    } else {
        pb.finish_with_message("done");
    }

    let record = &outcome.record;
    println!("  fingerprint: {}", record.fingerprint);
    println!("  name:        {}", record.display_name);
    println!("  chunks:      {} ({} uploaded now)", record.chunk_count, outcome.uploaded);
    if let Some(first) = outcome.resumed_from {
        println!("  resumed:     from chunk {first}");
    }
    println!("  stored:      {}", fmt_bytes(record.total_stored_size));
    println!("  encrypted:   {}", if password.is_some() { "yes" } else { "no" });
    Ok(())
}

// ── `tglfs lookup` ────────────────────────────────────────────────────────────

async fn cmd_lookup(archive: &Archive, term: &str, from: Option<&str>) -> Result<()> {
    let directory = archive
        .lookup(term, from)
        .await
        .with_context(|| format!("looking up {term:?}"))?;

    if directory.is_empty() {
        println!("no files match {term:?}");
    } else {
        println!(
            "{:<64}  {:>10}  {:>9}  {:<23}  name",
            "fingerprint", "size", "chunks", "uploaded"
        );
        for record in directory.by_age() {
            println!(
                "{:<64}  {:>10}  {:>9}  {:<23}  {}{}",
                record.fingerprint,
                fmt_bytes(record.total_stored_size),
                format!("{}/{}", record.present.len(), record.chunk_count),
                fmt_timestamp(record.earliest_timestamp),
                record.display_name,
                record_status(record),
            );
        }
    }
    if !directory.skipped.is_empty() {
        println!("({} unreadable caption(s) skipped)", directory.skipped.len());
    }
    Ok(())
}

fn record_status(record: &FileRecord) -> String {
    if !record.divergent_counts.is_empty() {
        return format!("  [inconsistent: counts {:?}]", record.divergent_counts);
    }
    if !record.divergent_names.is_empty() {
        return format!("  [inconsistent: also named {:?}]", record.divergent_names);
    }
    let missing = record.missing_indices();
    if !missing.is_empty() {
        return format!("  [incomplete: missing {} chunk(s)]", missing.len());
    }
    if record.duplicates > 0 {
        return format!("  [{} duplicate chunk(s)]", record.duplicates);
    }
    String::new()
}

// ── `tglfs retrieve` ──────────────────────────────────────────────────────────

async fn cmd_retrieve(
    archive: &Archive,
    fingerprint: &str,
    dest: Option<&Path>,
    force: bool,
    password: &PasswordArgs,
) -> Result<()> {
    let fp = parse_fingerprint(fingerprint)?;
    let dest = match dest {
        Some(d) => d.to_path_buf(),
        None => {
            let directory = archive.lookup(fp.as_str(), None).await?;
            let record = directory
                .get(&fp)
                .with_context(|| format!("no stored file with fingerprint {fp}"))?;
            // Display names may contain slashes; keep only the last component
            let name = Path::new(&record.display_name)
                .file_name()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(fp.as_str()));
            PathBuf::from(".").join(name)
        }
    };
    if dest.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", dest.display());
    }
    let password = read_password(password, false)?;

    let pb = make_progress_bar(
        0,
        "retrieve",
        "{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
    );
    let progress = progress_callback(&pb);
    let outcome = archive
        .retrieve(&fp, &dest, password.as_ref(), Some(&progress))
        .await
        .with_context(|| format!("retrieving {fp}"))?;
    pb.finish_with_message("done");

    println!("  name:    {}", outcome.record.display_name);
    println!("  bytes:   {}", fmt_bytes(outcome.bytes_written));
    println!("  written: {}", outcome.destination.display());
    Ok(())
}

// ── `tglfs config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &TglfsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn fmt_timestamp(unix_secs: u64) -> String {
    i64::try_from(unix_secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix_secs.to_string())
}

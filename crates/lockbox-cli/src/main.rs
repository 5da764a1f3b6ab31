//! lockbox: password-protected file sharing from the command line
//!
//! Commands:
//!   upload <file>                 - encrypt and store a file
//!   read <id> | read --link <t>   - show metadata, or decrypt with a password
//!   share <id> <email>            - grant another user access
//!   revoke <id> <email>           - remove a grant
//!   link create <id> | expire <t> - manage share links
//!   ls / shared                   - list own files / files shared with you
//!   delete <id>                   - remove a file, its grants, links and blobs
//!   config show                   - display current configuration
//!
//! Passwords are read from LOCKBOX_PASSWORD or prompted for on the terminal.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use lockbox_core::config::LockboxConfig;
use lockbox_core::{ActorId, FileId, Permission};
use lockbox_share::{AccessError, AccessOutcome, FileMetadata, FileService, NewFile, Target};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "lockbox",
    version,
    about = "Password-protected file sharing",
    long_about = "lockbox: store files under per-file envelope encryption and share them by grant or link"
)]
struct Cli {
    /// Path to lockbox.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "LOCKBOX_CONFIG",
        default_value = "/etc/lockbox/config.toml"
    )]
    config: PathBuf,

    /// Acting user (email address)
    #[arg(long = "as", env = "LOCKBOX_USER", global = true)]
    actor: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides [logging] level
    #[arg(long, env = "LOCKBOX_LOG")]
    log: Option<String>,

    /// Log format; overrides [logging] format
    #[arg(long, env = "LOCKBOX_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a local file under a password and store it
    Upload {
        /// Local file to upload
        path: PathBuf,
        /// Display name (default: the file name)
        #[arg(long)]
        name: Option<String>,
        /// MIME type recorded with the file
        #[arg(long, default_value = "application/octet-stream")]
        content_type: String,
    },

    /// Show a file's metadata, or decrypt it when --decrypt is given
    Read {
        /// File id (authenticated access; requires --as)
        #[arg(required_unless_present = "link", conflicts_with = "link")]
        id: Option<FileId>,
        /// Share link token (anonymous access)
        #[arg(long)]
        link: Option<String>,
        /// Ask for the password and decrypt the content
        #[arg(long)]
        decrypt: bool,
        /// Write decrypted content here instead of stdout
        #[arg(long, short = 'o')]
        out: Option<PathBuf>,
    },

    /// Grant another user access to one of your files
    Share {
        id: FileId,
        /// Grantee email address
        grantee: String,
        /// view or download
        #[arg(long, default_value = "view")]
        permission: Permission,
    },

    /// Remove a user's grant on one of your files
    Revoke {
        id: FileId,
        /// Grantee email address
        grantee: String,
    },

    /// Share link management
    Link {
        #[command(subcommand)]
        action: LinkAction,
    },

    /// List your files
    Ls {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List files other users have shared with you
    Shared {
        #[arg(long)]
        json: bool,
    },

    /// Show the grants and links of one of your files
    Shares { id: FileId },

    /// Delete one of your files
    Delete { id: FileId },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum LinkAction {
    /// Create a share link
    Create {
        id: FileId,
        /// Lifetime in seconds (default: [sharing] default_link_ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Expire a share link now
    Expire { token: String },
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
    let (config, found) = load_config(&cli.config).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = match &cli.log_format {
        Some(f) => f.clone(),
        None if config.logging.format == "json" => LogFormat::Json,
        None => LogFormat::Text,
    };
    init_logging(&level, &format);
    if !found {
        tracing::warn!(
            "config file not found: {}  (using defaults)",
            cli.config.display()
        );
    }

    if let Commands::Config {
        action: ConfigAction::Show,
    } = &cli.command
    {
        return cmd_config_show(&config, &cli.config, found);
    }

    let service = FileService::from_config(&config).context("starting file service")?;
    let actor = cli.actor.as_deref().map(parse_actor).transpose()?;

    match cli.command {
        Commands::Upload {
            path,
            name,
            content_type,
        } => cmd_upload(&service, require(&actor)?, &path, name, content_type).await,
        Commands::Read {
            id,
            link,
            decrypt,
            out,
        } => {
            let target = match (id, link) {
                (_, Some(token)) => Target::Link(token),
                (Some(id), None) => Target::File(id),
                (None, None) => anyhow::bail!("either a file id or --link is required"),
            };
            cmd_read(&service, actor.as_ref(), target, decrypt, out.as_deref()).await
        }
        Commands::Share {
            id,
            grantee,
            permission,
        } => {
            let grantee = parse_actor(&grantee)?;
            let grant = service
                .share(require(&actor)?, &id, &grantee, permission)
                .await
                .map_err(public)?;
            println!("shared {} with {} ({})", id, grant.grantee, grant.permission);
            Ok(())
        }
        Commands::Revoke { id, grantee } => {
            let grantee = parse_actor(&grantee)?;
            service
                .revoke(require(&actor)?, &id, &grantee)
                .await
                .map_err(public)?;
            println!("revoked {grantee} on {id}");
            Ok(())
        }
        Commands::Link {
            action: LinkAction::Create { id, ttl },
        } => {
            let link = service
                .create_link(require(&actor)?, &id, ttl)
                .await
                .map_err(public)?;
            println!("{}", link.token);
            eprintln!("expires at {} (unix)", link.expires_at);
            Ok(())
        }
        Commands::Link {
            action: LinkAction::Expire { token },
        } => {
            let link = service
                .expire_link(require(&actor)?, &token)
                .await
                .map_err(public)?;
            println!("link for {} expired", link.file_id);
            Ok(())
        }
        Commands::Ls { json } => {
            let files = service.list_files(require(&actor)?).await;
            print_files(files.iter().map(|m| (m, None)), json)
        }
        Commands::Shared { json } => {
            let files = service.shared_with(require(&actor)?).await;
            print_files(files.iter().map(|(m, p)| (m, Some(*p))), json)
        }
        Commands::Shares { id } => {
            let (grants, links) = service
                .shares_of(require(&actor)?, &id)
                .await
                .map_err(public)?;
            for g in grants {
                println!("grant  {:<10} {}", g.permission, g.grantee);
            }
            for l in links {
                let state = if l.revoked { "revoked" } else { "" };
                println!("link   expires {:<12} {}", l.expires_at, state);
            }
            Ok(())
        }
        Commands::Delete { id } => {
            service
                .delete_file(require(&actor)?, &id)
                .await
                .map_err(public)?;
            println!("deleted {id}");
            Ok(())
        }
        Commands::Config { .. } => Ok(()),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Load the config file, or defaults when it does not exist. The flag
/// reports whether a file was found.
async fn load_config(path: &Path) -> Result<(LockboxConfig, bool)> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        let config = LockboxConfig::from_toml_str(&content)
            .with_context(|| format!("loading config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((LockboxConfig::default(), false))
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

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

// ── Helpers ───────────────────────────────────────────────────────────────────

fn parse_actor(s: &str) -> Result<ActorId> {
    s.parse::<ActorId>()
        .with_context(|| format!("not a valid email address: {s:?}"))
}

fn require(actor: &Option<ActorId>) -> Result<&ActorId> {
    actor
        .as_ref()
        .context("this command needs an acting user: pass --as <email> or set LOCKBOX_USER")
}

/// Reduce an access error to the text an end user may see.
fn public(e: AccessError) -> anyhow::Error {
    debug!(error = %e, "request failed");
    anyhow::anyhow!(e.public_message())
}

/// Password from LOCKBOX_PASSWORD, else an interactive prompt.
fn read_password(confirm: bool) -> Result<SecretString> {
    if let Ok(pw) = std::env::var("LOCKBOX_PASSWORD") {
        return Ok(SecretString::from(pw));
    }
    let pw = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let again = rpassword::prompt_password("Confirm password: ")
            .context("reading password confirmation")?;
        if pw != again {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(pw))
}

fn print_files<'a>(
    files: impl Iterator<Item = (&'a FileMetadata, Option<Permission>)>,
    json: bool,
) -> Result<()> {
    let files: Vec<_> = files.collect();
    if json {
        let rendered: Vec<serde_json::Value> = files
            .iter()
            .map(|(m, p)| -> Result<serde_json::Value, serde_json::Error> {
                let mut v = serde_json::to_value(m)?;
                if let (Some(p), Some(obj)) = (p, v.as_object_mut()) {
                    obj.insert("permission".into(), serde_json::to_value(p)?);
                }
                Ok(v)
            })
            .collect::<Result<_, _>>()
            .context("serializing file list")?;
        println!(
            "{}",
            serde_json::to_string_pretty(&rendered).context("serializing file list")?
        );
        return Ok(());
    }

    if files.is_empty() {
        println!("no files");
        return Ok(());
    }
    println!(
        "{:<36}  {:>10}  {:<8}  {:<12}  NAME",
        "ID", "SIZE", "SHARING", "UPLOADED"
    );
    for (m, p) in files {
        let name = match p {
            Some(p) => format!("{} ({p}, from {})", m.name, m.owner),
            None => m.name.clone(),
        };
        println!(
            "{:<36}  {:>10}  {:<8}  {:<12}  {}",
            m.id, m.size, m.sharing, m.uploaded_at, name
        );
    }
    Ok(())
}

// ── `lockbox upload` ──────────────────────────────────────────────────────────

async fn cmd_upload(
    service: &FileService,
    owner: &ActorId,
    path: &Path,
    name: Option<String>,
    content_type: String,
) -> Result<()> {
    let plaintext = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let name = match name {
        Some(n) => n,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("cannot derive a file name; pass --name")?,
    };
    let password = read_password(true)?;

    let record = service
        .create_file(
            owner,
            plaintext,
            password,
            NewFile { name, content_type },
        )
        .await
        .map_err(public)?;

    info!(file_id = %record.id, size = record.size, "upload complete");
    println!("{}", record.id);
    Ok(())
}

// ── `lockbox read` ────────────────────────────────────────────────────────────

async fn cmd_read(
    service: &FileService,
    requester: Option<&ActorId>,
    target: Target,
    decrypt: bool,
    out: Option<&Path>,
) -> Result<()> {
    let password = if decrypt {
        Some(read_password(false)?)
    } else {
        None
    };
    let outcome = service
        .read_file(target, requester, password)
        .await
        .map_err(public)?;

    match outcome {
        AccessOutcome::Metadata(m) => {
            println!("id:           {}", m.id);
            println!("name:         {}", m.name);
            println!("size:         {}", m.size);
            println!("content type: {}", m.content_type);
            println!("shared by:    {}", m.owner);
            println!("uploaded at:  {}", m.uploaded_at);
            println!("sharing:      {}", m.sharing);
        }
        AccessOutcome::Content {
            metadata, bytes, ..
        } => match out {
            Some(out) => {
                tokio::fs::write(out, &bytes)
                    .await
                    .with_context(|| format!("writing {}", out.display()))?;
                eprintln!("wrote {} bytes of {} to {}", bytes.len(), metadata.name, out.display());
            }
            None => {
                use std::io::Write;
                std::io::stdout()
                    .write_all(&bytes)
                    .context("writing content to stdout")?;
            }
        },
    }
    Ok(())
}

// ── `lockbox config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &LockboxConfig, config_path: &Path, found: bool) -> Result<()> {
    if found {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

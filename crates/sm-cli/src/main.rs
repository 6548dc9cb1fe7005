//! securematch: searchable encrypted document store CLI
//!
//! Commands:
//!   master-key generate              - print a fresh base64 master key
//!   config show                      - display the active configuration
//!   status                           - check master key and storage
//!   ingest <file|->                  - encrypt and index a document or an array of documents
//!   search internal                  - conjunctive field search, decrypted results
//!   search external                  - trapdoor search, ciphertext results
//!   auditor keygen|register|rotate   - auditor key management
//!   auditor show|logs|entry          - auditor records and audit log
//!   trapdoor issue                   - sign a keyword hash with an auditor key
//!
//! Results are JSON on stdout. Logs go to stderr. Failures print an opaque
//! message and exit non-zero; the detail is in the logs.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

use sm_core::config::SmConfig;
use sm_core::{ExternalSearchAudit, SmError, SmResult, Trapdoor};
use sm_search::timing::serialize_ms;
use sm_search::{ExternalSearchRequest, IngestReceipt, SecureMatch};
use sm_storage::StorageHealth;

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "securematch",
    version,
    about = "Searchable encrypted document store",
    long_about = "securematch: encrypt documents, search them by keyword, and grant auditors \
                  signed, ciphertext-only search"
)]
struct Cli {
    /// Path to securematch.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "SECUREMATCH_CONFIG",
        default_value = "securematch.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides [log] level
    #[arg(long, env = "SECUREMATCH_LOG")]
    log: Option<String>,

    /// Log format. Overrides [log] format
    #[arg(long, env = "SECUREMATCH_LOG_FORMAT")]
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
    /// Master key utilities
    #[command(name = "master-key")]
    MasterKey {
        #[command(subcommand)]
        action: MasterKeyAction,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check that the master key loads and storage is reachable
    Status,

    /// Encrypt and index documents from a JSON file (`-` for stdin)
    ///
    /// The file holds one JSON object or an array of objects.
    Ingest { file: PathBuf },

    /// Search the index
    Search {
        #[command(subcommand)]
        action: SearchAction,
    },

    /// Auditor accounts and audit log
    Auditor {
        #[command(subcommand)]
        action: AuditorAction,
    },

    /// Auditor-side trapdoor tools
    Trapdoor {
        #[command(subcommand)]
        action: TrapdoorAction,
    },
}

#[derive(Subcommand, Debug)]
enum MasterKeyAction {
    /// Print a fresh random 256-bit key for the master key variable
    Generate,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Subcommand, Debug)]
enum SearchAction {
    /// Conjunctive search returning decrypted documents
    Internal {
        /// Query as a JSON object, e.g. '{"email": "alice@example.com"}'
        #[arg(long, conflicts_with = "field", required_unless_present = "field")]
        query: Option<String>,

        /// One FIELD=VALUE term; repeat for an AND query
        #[arg(long, short = 'f', value_name = "FIELD=VALUE")]
        field: Vec<String>,
    },

    /// Trapdoor search returning ciphertext only
    External {
        #[arg(long)]
        auditor_id: Option<String>,

        #[arg(long)]
        public_hash: Option<String>,

        /// Hex RSA-PSS signature over the public hash
        #[arg(long)]
        signature: Option<String>,

        /// JSON file from `trapdoor issue`; fills --public-hash and --signature
        #[arg(long)]
        trapdoor: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum AuditorAction {
    /// Generate an RSA keypair into a directory (auditor.pem, auditor.pub.pem)
    Keygen {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Register an auditor with an existing public key
    Register {
        #[arg(long)]
        name: String,

        /// PEM public key file (SPKI or PKCS#1, RSA >= 2048 bits)
        #[arg(long)]
        public_key: PathBuf,
    },

    /// Replace an auditor's key; the new private key is written once
    Rotate {
        auditor_id: String,

        /// Where to write the new private key. Must not exist
        #[arg(long)]
        private_key_out: PathBuf,
    },

    /// Show an auditor record
    Show { auditor_id: String },

    /// List an auditor's external search attempts, oldest first
    Logs { auditor_id: String },

    /// Show one audit row by id
    Entry { audit_id: String },
}

#[derive(Subcommand, Debug)]
enum TrapdoorAction {
    /// Hash a keyword (or take a precomputed hash) and sign it
    Issue {
        /// Auditor private key (PKCS#8 or PKCS#1 PEM)
        #[arg(long, env = "SECUREMATCH_AUDITOR_KEY")]
        private_key: PathBuf,

        /// Keyword to search for
        #[arg(long, conflicts_with = "public_hash", required_unless_present = "public_hash")]
        value: Option<String>,

        /// Already computed SHA-256 of the normalized keyword
        #[arg(long)]
        public_hash: Option<String>,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = SmConfig::load(&cli.config);

    let (level, format) = log_settings(&cli, config.as_ref().ok());
    init_logging(&level, &format);

    if !cli.config.exists() {
        warn!("config file not found: {}  (using defaults)", cli.config.display());
    }

    let result = match config {
        Ok(config) => run(cli, config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: SmConfig) -> Result<()> {
    match cli.command {
        Commands::MasterKey {
            action: MasterKeyAction::Generate,
        } => cmd_master_key_generate(&config),
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &cli.config),
        Commands::Status => cmd_status(&config).await,
        Commands::Ingest { file } => cmd_ingest(&SecureMatch::open(&config)?, &file).await,
        Commands::Search { action } => {
            let service = SecureMatch::open(&config)?;
            match action {
                SearchAction::Internal { query, field } => {
                    cmd_search_internal(&service, query.as_deref(), &field).await
                }
                SearchAction::External {
                    auditor_id,
                    public_hash,
                    signature,
                    trapdoor,
                } => {
                    let request = external_request(auditor_id, public_hash, signature, trapdoor.as_deref())?;
                    print_json(&service.search_external(&request).await?)
                }
            }
        }
        Commands::Auditor { action } => cmd_auditor(&config, action).await,
        Commands::Trapdoor {
            action:
                TrapdoorAction::Issue {
                    private_key,
                    value,
                    public_hash,
                },
        } => cmd_trapdoor_issue(&private_key, value.as_deref(), public_hash.as_deref()),
    }
}

/// Print the caller-safe message for `err`. The full chain goes to the log.
fn report(err: &anyhow::Error) {
    match err.downcast_ref::<SmError>() {
        Some(sm) => {
            error!(error = %sm, status = sm.status_code(), "command failed");
            eprintln!("error: {}", sm.public_message());
        }
        None => {
            error!(error = ?err, "command failed");
            eprintln!("error: {err:#}");
        }
    }
}

fn log_settings(cli: &Cli, config: Option<&SmConfig>) -> (String, LogFormat) {
    let level = cli
        .log
        .clone()
        .or_else(|| config.map(|c| c.log.level.clone()))
        .unwrap_or_else(|| "info".into());
    let format = cli
        .log_format
        .clone()
        .or_else(|| config.and_then(|c| LogFormat::from_str(&c.log.format, true).ok()))
        .unwrap_or(LogFormat::Text);
    (level, format)
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

// ── `securematch master-key generate` / `config show` / `status` ─────────────

fn cmd_master_key_generate(config: &SmConfig) -> Result<()> {
    print_json(&serde_json::json!({
        "env": config.keys.master_key_env,
        "master_key": sm_crypto::generate_master_key(),
    }))
}

fn cmd_config_show(config: &SmConfig, config_path: &Path) -> Result<()> {
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

#[derive(Serialize)]
struct StatusReport<'a> {
    version: &'static str,
    master_key_env: &'a str,
    master_key_loaded: bool,
    storage_backend: sm_core::config::StorageBackend,
    storage: Option<StorageReport>,
    searchable_fields: &'a [String],
}

#[derive(Serialize)]
struct StorageReport {
    scheme: String,
    reachable: bool,
    #[serde(serialize_with = "serialize_ms")]
    latency_ms: f64,
}

impl From<StorageHealth> for StorageReport {
    fn from(health: StorageHealth) -> Self {
        Self {
            scheme: health.scheme,
            reachable: health.reachable,
            latency_ms: health.latency_ms,
        }
    }
}

async fn cmd_status(config: &SmConfig) -> Result<()> {
    let master_key_loaded = match sm_crypto::load_master_key(&config.keys.master_key_env) {
        Ok(_) => true,
        Err(e) => {
            warn!(error = %e, "master key unavailable");
            false
        }
    };

    let storage = match sm_storage::build_from_core_config(&config.storage) {
        Ok(op) => Some(sm_storage::probe(&op).await),
        Err(e) => {
            warn!(error = %e, "storage unavailable");
            None
        }
    };
    let storage_ok = storage.as_ref().is_some_and(|h| h.reachable);

    print_json(&StatusReport {
        version: env!("CARGO_PKG_VERSION"),
        master_key_env: &config.keys.master_key_env,
        master_key_loaded,
        storage_backend: config.storage.backend,
        storage: storage.map(StorageReport::from),
        searchable_fields: &config.index.searchable_fields,
    })?;

    if master_key_loaded && storage_ok {
        Ok(())
    } else {
        Err(SmError::Configuration("status check failed".into()).into())
    }
}

// ── `securematch ingest` ──────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(untagged)]
enum BatchItem {
    Ingested(IngestReceipt),
    Failed { error: &'static str },
}

async fn cmd_ingest(service: &SecureMatch, file: &Path) -> Result<()> {
    let input = read_json_input(file)?;

    let Value::Array(documents) = input else {
        return print_json(&service.ingest(input).await?);
    };

    let total = documents.len();
    let items: Vec<BatchItem> = service
        .ingest_many(documents)
        .await
        .into_iter()
        .enumerate()
        .map(|(i, r)| match r {
            Ok(receipt) => BatchItem::Ingested(receipt),
            Err(e) => {
                warn!(index = i, error = %e, "document rejected");
                BatchItem::Failed {
                    error: e.public_message(),
                }
            }
        })
        .collect();

    let failed = items
        .iter()
        .filter(|i| matches!(i, BatchItem::Failed { .. }))
        .count();
    print_json(&items)?;
    info!(total, failed, "batch ingest finished");

    if failed > 0 {
        anyhow::bail!("{failed} of {total} documents failed");
    }
    Ok(())
}

// ── `securematch search` ──────────────────────────────────────────────────────

async fn cmd_search_internal(service: &SecureMatch, query: Option<&str>, fields: &[String]) -> Result<()> {
    let result = match query {
        Some(raw) => {
            let query: Value = serde_json::from_str(raw)
                .map_err(|e| SmError::Validation(format!("query is not JSON: {e}")))?;
            service.search_internal(&query).await?
        }
        None => {
            let terms = fields
                .iter()
                .map(|f| parse_field(f))
                .collect::<SmResult<Vec<_>>>()?;
            service.search_internal_terms(&terms).await?
        }
    };
    print_json(&result)
}

fn parse_field(term: &str) -> SmResult<(String, String)> {
    match term.split_once('=') {
        Some((field, value)) if !field.trim().is_empty() => {
            Ok((field.trim().to_string(), value.to_string()))
        }
        _ => Err(SmError::Validation(format!(
            "expected FIELD=VALUE, got {term:?}"
        ))),
    }
}

fn external_request(
    auditor_id: Option<String>,
    public_hash: Option<String>,
    signature: Option<String>,
    trapdoor: Option<&Path>,
) -> Result<ExternalSearchRequest> {
    let mut request = ExternalSearchRequest {
        auditor_id,
        public_hash,
        signature,
    };
    if let Some(path) = trapdoor {
        let trapdoor: Trapdoor = serde_json::from_value(read_json_input(path)?)
            .map_err(|e| SmError::Validation(format!("trapdoor file: {e}")))?;
        request.public_hash.get_or_insert(trapdoor.public_hash);
        request.signature.get_or_insert(trapdoor.signature);
    }
    Ok(request)
}

// ── `securematch auditor` ─────────────────────────────────────────────────────

fn cmd_auditor_keygen(out_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("creating {}", out_dir.display()))?;
    let private_path = out_dir.join("auditor.pem");
    let public_path = out_dir.join("auditor.pub.pem");

    let keypair = sm_crypto::generate_keypair()?;
    write_private_key(&private_path, keypair.private_pem())?;
    std::fs::write(&public_path, &keypair.public_pem)
        .with_context(|| format!("writing {}", public_path.display()))?;

    print_json(&serde_json::json!({
        "private_key": private_path,
        "public_key": public_path,
    }))
}

/// Everything but `keygen` needs the master key and storage.
async fn cmd_auditor(config: &SmConfig, action: AuditorAction) -> Result<()> {
    let service = || SecureMatch::open(config);

    match action {
        AuditorAction::Keygen { out_dir } => cmd_auditor_keygen(&out_dir),
        AuditorAction::Register { name, public_key } => {
            let pem = std::fs::read_to_string(&public_key)
                .with_context(|| format!("reading {}", public_key.display()))?;
            print_json(&service()?.register_auditor(&name, &pem).await?)
        }
        AuditorAction::Rotate {
            auditor_id,
            private_key_out,
        } => {
            if private_key_out.exists() {
                anyhow::bail!("refusing to overwrite {}", private_key_out.display());
            }
            let rotated = service()?.rotate_auditor_key(&auditor_id).await?;
            write_private_key(&private_key_out, &rotated.private_key_pem)?;
            print_json(&rotated.auditor)
        }
        AuditorAction::Show { auditor_id } => print_json(&service()?.auditor(&auditor_id).await?),
        AuditorAction::Logs { auditor_id } => {
            let rows = service()?.audit_log(&auditor_id).await?;
            print_json(&rows.iter().map(AuditRow::from).collect::<Vec<_>>())
        }
        AuditorAction::Entry { audit_id } => {
            print_json(&AuditRow::from(&service()?.audit_entry(&audit_id).await?))
        }
    }
}

/// An audit row as printed: timing rounded, the stored row untouched.
#[derive(Serialize)]
struct AuditRow<'a> {
    id: &'a str,
    auditor_id: &'a str,
    public_hash: &'a str,
    total_matches: usize,
    returned_count: usize,
    truncated: bool,
    #[serde(serialize_with = "serialize_ms")]
    execution_time_ms: f64,
    success: bool,
    timestamp: u64,
}

impl<'a> From<&'a ExternalSearchAudit> for AuditRow<'a> {
    fn from(row: &'a ExternalSearchAudit) -> Self {
        Self {
            id: &row.id,
            auditor_id: &row.auditor_id,
            public_hash: &row.public_hash,
            total_matches: row.total_matches,
            returned_count: row.returned_count,
            truncated: row.truncated,
            execution_time_ms: row.execution_time_ms,
            success: row.success,
            timestamp: row.timestamp,
        }
    }
}

// ── `securematch trapdoor issue` ──────────────────────────────────────────────

fn cmd_trapdoor_issue(private_key: &Path, value: Option<&str>, public_hash: Option<&str>) -> Result<()> {
    let pem = SecretString::from(
        std::fs::read_to_string(private_key)
            .with_context(|| format!("reading {}", private_key.display()))?,
    );

    let trapdoor = match (value, public_hash) {
        (Some(value), _) => sm_crypto::issue_trapdoor(value, &pem)?,
        (None, Some(hash)) => Trapdoor {
            public_hash: hash.to_string(),
            signature: sm_crypto::sign_public_hash(hash, &pem)?,
        },
        (None, None) => {
            return Err(SmError::Validation("--value or --public-hash is required".into()).into())
        }
    };
    print_json(&trapdoor)
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{rendered}");
    Ok(())
}

/// Parse JSON from a file, or from stdin when the path is `-`.
fn read_json_input(path: &Path) -> Result<Value> {
    let raw = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        buf
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    };
    let value = serde_json::from_str(&raw)
        .map_err(|e| SmError::Validation(format!("{} is not JSON: {e}", path.display())))?;
    Ok(value)
}

/// Write a private key readable by the owner only. Never overwrites.
fn write_private_key(path: &Path, pem: &SecretString) -> Result<()> {
    let mut opts = std::fs::OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts
        .open(path)
        .with_context(|| format!("creating {}", path.display()))?;
    file.write_all(pem.expose_secret().as_bytes())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_row_prints_rounded_timing() {
        let row = ExternalSearchAudit {
            id: "a1".into(),
            auditor_id: "aud".into(),
            public_hash: "ab".into(),
            total_matches: 3,
            returned_count: 3,
            truncated: false,
            execution_time_ms: 12.345678,
            success: true,
            timestamp: 7,
        };
        let printed = serde_json::to_value(AuditRow::from(&row)).unwrap();
        assert_eq!(printed["execution_time_ms"], 12.35);
        assert_eq!(printed["id"], "a1");
        assert_eq!(row.execution_time_ms, 12.345678);
    }

    #[test]
    fn test_storage_report_prints_rounded_latency() {
        let report = StorageReport::from(StorageHealth {
            scheme: "memory".into(),
            reachable: true,
            latency_ms: 0.123456,
        });
        let printed = serde_json::to_value(report).unwrap();
        assert_eq!(printed["latency_ms"], 0.12);
        assert_eq!(printed["scheme"], "memory");
    }

    #[tokio::test]
    async fn test_auditor_keygen_needs_no_master_key() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = SmConfig::default();
        config.keys.master_key_env = "SM_CLI_TEST_UNSET_MASTER_KEY".into();

        let action = AuditorAction::Keygen {
            out_dir: tmp.path().to_path_buf(),
        };
        cmd_auditor(&config, action).await.unwrap();
        assert!(tmp.path().join("auditor.pem").is_file());
        assert!(tmp.path().join("auditor.pub.pem").is_file());

        let show = AuditorAction::Show {
            auditor_id: "aud".into(),
        };
        let err = cmd_auditor(&config, show).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<SmError>(), Some(SmError::Configuration(_))));
    }

    #[test]
    fn test_parse_field() {
        assert_eq!(
            parse_field("email=a@b.c").unwrap(),
            ("email".to_string(), "a@b.c".to_string())
        );
        assert_eq!(
            parse_field("note=x=y").unwrap(),
            ("note".to_string(), "x=y".to_string())
        );
        assert!(matches!(parse_field("email"), Err(SmError::Validation(_))));
        assert!(matches!(parse_field("=x"), Err(SmError::Validation(_))));
    }

    #[test]
    fn test_cli_parses_internal_search_terms() {
        let cli = Cli::try_parse_from([
            "securematch", "search", "internal", "-f", "email=a@b.c", "-f", "name=Al",
        ])
        .unwrap();
        match cli.command {
            Commands::Search {
                action: SearchAction::Internal { query, field },
            } => {
                assert!(query.is_none());
                assert_eq!(field, vec!["email=a@b.c", "name=Al"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_cli_query_conflicts_with_field() {
        let result = Cli::try_parse_from([
            "securematch", "search", "internal", "--query", "{}", "-f", "a=b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_external_request_from_trapdoor_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("trapdoor.json");
        std::fs::write(&path, r#"{"public_hash": "ab", "signature": "cd"}"#).unwrap();

        let request = external_request(Some("aud".into()), None, None, Some(&path)).unwrap();
        assert_eq!(request.public_hash.as_deref(), Some("ab"));
        assert_eq!(request.signature.as_deref(), Some("cd"));

        let explicit =
            external_request(Some("aud".into()), Some("ef".into()), None, Some(&path)).unwrap();
        assert_eq!(explicit.public_hash.as_deref(), Some("ef"));
    }

    #[test]
    fn test_write_private_key_refuses_overwrite() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("key.pem");
        let pem = SecretString::from("secret".to_string());

        write_private_key(&path, &pem).unwrap();
        assert!(write_private_key(&path, &pem).is_err());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_log_settings_prefer_flags() {
        let cli = Cli::try_parse_from(["securematch", "--log", "debug", "status"]).unwrap();
        let mut config = SmConfig::default();
        config.log.format = "json".into();

        let (level, format) = log_settings(&cli, Some(&config));
        assert_eq!(level, "debug");
        assert!(matches!(format, LogFormat::Json));
    }
}

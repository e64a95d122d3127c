//! toolpin CLI
//!
//! Entry point for the `toolpin` command-line tool.

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;
use toolpin::batch::{check_manifest, verify_manifest, BatchReport, Manifest};
use toolpin::config::{env_layer_from_process, ConfigPaths, EffectiveConfig};
use toolpin::logging::{self, LogFormat};
use toolpin::registry::{Platform, ToolRegistry};
use toolpin::session::Session;
use toolpin::{
    AgentOptions, AutoUpdateAgent, DownloadRequest, ErrorKind, ExitCode, PinnedDatabase, PinnedStore, Resolver,
    Settings, Verifier,
};
use toolpin_store::StoreError;
use url::Url;

#[derive(Parser)]
#[command(name = "toolpin")]
#[command(about = "Resolve tool versions and verify downloads against trusted checksums", version)]
struct Cli {
    /// Repo config file (default: ./.toolpin.toml)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Refuse artifacts that only a locally computed digest vouches for
    #[arg(long, global = true)]
    require_verified: bool,

    /// Pinned checksum database (default: checksums.json)
    #[arg(long, global = true)]
    pinned_db: Option<PathBuf>,

    /// Log format on stderr (human, json)
    #[arg(long, global = true, default_value = "human")]
    log_format: LogFormat,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a version spec to a concrete version
    Resolve {
        tool: String,

        /// Exact version, partial version (`22`, `3.12`) or channel (`stable`, `lts`)
        spec: String,
    },

    /// Download one artifact and verify it
    Verify {
        tool: String,

        /// Version spec; resolved before download
        version: String,

        /// Target platform (default: host)
        #[arg(long, short = 'p')]
        platform: Option<String>,

        /// Where to write the verified artifact
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Download from this URL instead of the registry's
        #[arg(long)]
        url: Option<String>,

        /// Also write the verification report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Resolve and verify every tool in a manifest
    Batch {
        manifest: PathBuf,

        /// Artifacts land in <dir>/<tool>/<version>/<platform>/
        #[arg(long, default_value = "downloads")]
        output_dir: PathBuf,
    },

    /// List registered tools
    Tools,

    /// Print the effective configuration
    Config,

    /// Pinned checksum database commands
    Pins {
        #[command(subcommand)]
        action: PinsCommands,
    },
}

#[derive(Subcommand)]
enum PinsCommands {
    /// Check the database structure
    Validate,

    /// List pinned records
    Show {
        /// Only records for this tool
        #[arg(long, short = 't')]
        tool: Option<String>,
    },

    /// Re-derive pins for a manifest and write them
    Update {
        manifest: PathBuf,

        /// Replace pins whose digest changed upstream
        #[arg(long)]
        allow_repin: bool,

        /// Accept locally computed digests as pins
        #[arg(long)]
        allow_calculated: bool,

        /// Report only, leave the database untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Report manifest entries whose pins lag the resolved version
    Check { manifest: PathBuf },

    /// Remove records or old backups
    Prune {
        /// Remove records for this tool
        #[arg(long, short = 't', conflicts_with = "backups")]
        tool: Option<String>,

        /// Only this version of --tool
        #[arg(long, requires = "tool")]
        version: Option<String>,

        /// Delete backups beyond the retention count
        #[arg(long)]
        backups: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    logging::init(cli.log_format);

    let config = match load_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(ExitCode::InvalidInput.as_i32());
        }
    };
    let settings = &config.settings;
    let json_output = cli.json;

    let code = match cli.command {
        Commands::Resolve { tool, spec } => run_resolve(settings, &tool, &spec, json_output),
        Commands::Verify {
            tool,
            version,
            platform,
            output,
            url,
            report,
        } => run_verify(
            settings,
            VerifyArgs {
                tool,
                version,
                platform,
                output,
                url,
                report,
            },
            json_output,
        ),
        Commands::Batch { manifest, output_dir } => run_batch(settings, &manifest, &output_dir, json_output),
        Commands::Tools => run_tools(settings, json_output),
        Commands::Config => print_json(&config.to_json()),
        Commands::Pins { action } => match action {
            PinsCommands::Validate => run_pins_validate(settings, json_output),
            PinsCommands::Show { tool } => run_pins_show(settings, tool.as_deref(), json_output),
            PinsCommands::Update {
                manifest,
                allow_repin,
                allow_calculated,
                dry_run,
            } => run_pins_update(
                settings,
                &manifest,
                AgentOptions {
                    allow_repin,
                    allow_calculated,
                    dry_run,
                },
                json_output,
            ),
            PinsCommands::Check { manifest } => run_pins_check(settings, &manifest, json_output),
            PinsCommands::Prune { tool, version, backups } => {
                run_pins_prune(settings, tool.as_deref(), version.as_deref(), backups)
            }
        },
    };

    process::exit(code.as_i32());
}

fn load_config(cli: &Cli) -> Result<EffectiveConfig, toolpin::config::ConfigError> {
    let mut paths = ConfigPaths::discover();
    if let Some(ref path) = cli.config {
        paths = paths.with_repo(path);
    }

    let mut overrides = serde_json::Map::new();
    if cli.require_verified {
        overrides.insert("verification".to_string(), json!({ "require_verified": true }));
    }
    if let Some(ref path) = cli.pinned_db {
        overrides.insert("pinned_db".to_string(), json!(path));
    }
    let cli_layer = (!overrides.is_empty()).then_some(Value::Object(overrides));

    EffectiveConfig::build(&paths, env_layer_from_process()?, cli_layer)
}

/// Report an error and hand back its exit code.
fn fail(kind: ErrorKind, message: impl std::fmt::Display) -> ExitCode {
    eprintln!("error [{}]: {}", kind, message);
    kind.exit_code()
}

fn print_json(json: &Result<String, serde_json::Error>) -> ExitCode {
    match json {
        Ok(json) => {
            println!("{}", json);
            ExitCode::Success
        }
        Err(e) => fail(ErrorKind::Io, format!("serializing output: {}", e)),
    }
}

fn registry_and_session(settings: &Settings) -> Result<(ToolRegistry, Session), ExitCode> {
    let registry = settings
        .registry()
        .map_err(|e| fail(ErrorKind::InvalidSpec, e))?;
    let session = settings.session().map_err(|e| fail(ErrorKind::Network, e))?;
    Ok((registry, session))
}

fn store_failure(e: StoreError) -> ExitCode {
    let kind = if e.is_corrupt() || matches!(e, StoreError::NotFound(_)) {
        ErrorKind::StoreCorrupt
    } else {
        ErrorKind::Io
    };
    fail(kind, e)
}

/// The pinned database if present. A broken file is an error; a missing one is not.
fn load_pinned(store: &PinnedStore) -> Result<Option<PinnedDatabase>, ExitCode> {
    match store.load() {
        Ok(db) => Ok(Some(db)),
        Err(StoreError::NotFound(path)) => {
            tracing::debug!(path = %path.display(), "no pinned database");
            Ok(None)
        }
        Err(e) => Err(store_failure(e)),
    }
}

fn run_resolve(settings: &Settings, tool: &str, spec: &str, json_output: bool) -> ExitCode {
    let (registry, mut session) = match registry_and_session(settings) {
        Ok(pair) => pair,
        Err(code) => return code,
    };

    match Resolver::new(&registry).resolve(&mut session, tool, spec) {
        Ok(selection) => {
            if json_output {
                print_json(&serde_json::to_string_pretty(&selection.resolved))
            } else {
                println!("{}", selection.resolved.version);
                ExitCode::Success
            }
        }
        Err(e) => fail(e.kind(), e),
    }
}

struct VerifyArgs {
    tool: String,
    version: String,
    platform: Option<String>,
    output: PathBuf,
    url: Option<String>,
    report: Option<PathBuf>,
}

fn parse_platform(raw: Option<&str>) -> Result<Platform, String> {
    match raw {
        Some(raw) => raw.parse(),
        None => Platform::host().ok_or_else(|| {
            format!(
                "host architecture '{}' is not a supported platform; pass --platform",
                std::env::consts::ARCH
            )
        }),
    }
}

fn run_verify(settings: &Settings, args: VerifyArgs, json_output: bool) -> ExitCode {
    let platform = match parse_platform(args.platform.as_deref()) {
        Ok(p) => p,
        Err(e) => return fail(ErrorKind::InvalidSpec, e),
    };
    let url = match args.url.as_deref().map(Url::parse).transpose() {
        Ok(url) => url,
        Err(e) => return fail(ErrorKind::InvalidSpec, format!("--url: {}", e)),
    };

    let (registry, mut session) = match registry_and_session(settings) {
        Ok(pair) => pair,
        Err(code) => return code,
    };
    let pinned = match load_pinned(&settings.store()) {
        Ok(db) => db,
        Err(code) => return code,
    };

    let resolved = match Resolver::new(&registry).resolve_version(&mut session, &args.tool, &args.version) {
        Ok(r) => r,
        Err(e) => return fail(e.kind(), e),
    };

    let mut request = DownloadRequest::new(&args.tool, &resolved.version, platform, &args.output);
    if let Some(url) = url {
        request = request.with_url(url);
    }

    let mut verifier = Verifier::new(&registry, settings.policy());
    if let Some(ref db) = pinned {
        verifier = verifier.with_pinned(db);
    }

    let outcome = match verifier.verify_download(&mut session, &request) {
        Ok(o) => o,
        Err(e) => return fail(e.kind(), e),
    };

    // Warnings go to stderr even in JSON mode.
    for warning in &outcome.warnings {
        eprintln!("warning: {}", warning);
    }

    if let Some(ref path) = args.report {
        if let Err(e) = outcome.write_to_file(path) {
            return fail(ErrorKind::Io, format!("writing report {}: {}", path.display(), e));
        }
    }

    if json_output {
        return print_json(&outcome.to_json());
    }

    println!("{} {} ({})", outcome.tool, outcome.version, outcome.platform);
    println!("  Path: {}", outcome.path.display());
    println!("  Tier: {}", outcome.tier);
    println!("  Source: {}", outcome.digest_source);
    println!("  {}: {}", outcome.algorithm, outcome.digest);
    ExitCode::Success
}

fn run_batch(settings: &Settings, manifest_path: &Path, output_dir: &Path, json_output: bool) -> ExitCode {
    let manifest = match Manifest::load(manifest_path) {
        Ok(m) => m,
        Err(e) => return fail(e.kind(), e),
    };
    let (registry, mut session) = match registry_and_session(settings) {
        Ok(pair) => pair,
        Err(code) => return code,
    };
    let pinned = match load_pinned(&settings.store()) {
        Ok(db) => db,
        Err(code) => return code,
    };

    let report = verify_manifest(
        &mut session,
        &registry,
        pinned.as_ref(),
        settings.policy(),
        &manifest,
        output_dir,
    );
    emit_batch(&report, json_output)
}

fn run_pins_check(settings: &Settings, manifest_path: &Path, json_output: bool) -> ExitCode {
    let manifest = match Manifest::load(manifest_path) {
        Ok(m) => m,
        Err(e) => return fail(e.kind(), e),
    };
    let (registry, mut session) = match registry_and_session(settings) {
        Ok(pair) => pair,
        Err(code) => return code,
    };
    let pinned = match settings.store().load_or_empty() {
        Ok(db) => db,
        Err(e) => return store_failure(e),
    };

    let report = check_manifest(&mut session, &registry, &pinned, &manifest);
    emit_batch(&report, json_output)
}

fn emit_batch(report: &BatchReport, json_output: bool) -> ExitCode {
    for entry in &report.entries {
        for warning in &entry.warnings {
            eprintln!("warning: {}@{} ({}): {}", entry.tool, entry.spec, entry.platform, warning);
        }
    }

    if json_output {
        let code = print_json(&report.to_json());
        if !code.is_success() {
            return code;
        }
    } else {
        for entry in &report.entries {
            let version = entry.version.as_deref().unwrap_or("-");
            let detail = match (&entry.error, entry.tier) {
                (Some(err), _) => err.clone(),
                (None, Some(tier)) => tier.to_string(),
                (None, None) if !entry.pinned_versions.is_empty() => {
                    format!("pinned: {}", entry.pinned_versions.join(", "))
                }
                (None, None) => String::new(),
            };
            println!(
                "  {:<10} {:<10} {:<8} {:<12} {:?}  {}",
                entry.tool, entry.spec, entry.platform, version, entry.status, detail
            );
        }
    }

    report.exit_code()
}

fn run_tools(settings: &Settings, json_output: bool) -> ExitCode {
    let registry = match settings.registry() {
        Ok(r) => r,
        Err(e) => return fail(ErrorKind::InvalidSpec, e),
    };

    if json_output {
        let tools: Vec<Value> = registry
            .providers()
            .map(|p| {
                json!({
                    "id": p.id(),
                    "description": p.description(),
                    "has_feed": p.feed().is_some(),
                    "algorithm": p.default_algorithm(),
                })
            })
            .collect();
        return print_json(&serde_json::to_string_pretty(&tools));
    }

    for provider in registry.providers() {
        println!("  {:<10} {}", provider.id(), provider.description());
    }
    ExitCode::Success
}

fn run_pins_validate(settings: &Settings, json_output: bool) -> ExitCode {
    let store = settings.store();
    match store.load() {
        Ok(db) => {
            if json_output {
                let summary = json!({
                    "path": store.path(),
                    "valid": true,
                    "records": db.checksums.len(),
                    "generated": db.metadata.generated,
                });
                print_json(&serde_json::to_string_pretty(&summary))
            } else {
                println!(
                    "Pinned database valid: {} ({} records)",
                    store.path().display(),
                    db.checksums.len()
                );
                ExitCode::Success
            }
        }
        Err(e) => store_failure(e),
    }
}

fn run_pins_show(settings: &Settings, tool: Option<&str>, json_output: bool) -> ExitCode {
    let db = match settings.store().load() {
        Ok(db) => db,
        Err(e) => return store_failure(e),
    };
    let records: Vec<_> = db
        .checksums
        .iter()
        .filter(|r| tool.map_or(true, |t| r.tool == t))
        .collect();

    if json_output {
        return print_json(&serde_json::to_string_pretty(&records));
    }

    if records.is_empty() {
        println!("No pinned records.");
        return ExitCode::Success;
    }
    for r in records {
        println!(
            "  {:<10} {:<12} {:<6} {} {} ({})",
            r.tool, r.version, r.platform, r.algorithm, r.digest, r.captured_tier
        );
    }
    ExitCode::Success
}

fn run_pins_update(settings: &Settings, manifest_path: &Path, options: AgentOptions, json_output: bool) -> ExitCode {
    let manifest = match Manifest::load(manifest_path) {
        Ok(m) => m,
        Err(e) => return fail(e.kind(), e),
    };
    let (registry, mut session) = match registry_and_session(settings) {
        Ok(pair) => pair,
        Err(code) => return code,
    };
    let store = settings.store();

    let report = match AutoUpdateAgent::new(&registry, &store, options).run(&mut session, &manifest) {
        Ok(r) => r,
        Err(e) => return fail(e.kind(), e),
    };

    if json_output {
        let code = print_json(&report.to_json());
        if !code.is_success() {
            return code;
        }
    } else {
        for entry in &report.entries {
            let version = entry.version.as_deref().unwrap_or("-");
            let detail = entry
                .error
                .clone()
                .or_else(|| entry.previous_digest.as_ref().map(|d| format!("pinned {}", d)))
                .unwrap_or_default();
            println!(
                "  {:<10} {:<12} {:<6} {:?}  {}",
                entry.tool, version, entry.platform, entry.action, detail
            );
        }
        match (&report.store_write, report.dry_run) {
            (_, true) => println!("Dry run: pinned database not written."),
            (Some(write), false) => println!("Wrote {} records to {}", write.records, store.path().display()),
            (None, false) => println!("Pinned database unchanged."),
        }
    }

    report.exit_code()
}

fn run_pins_prune(settings: &Settings, tool: Option<&str>, version: Option<&str>, backups: bool) -> ExitCode {
    let store = settings.store();

    if backups {
        return match store.prune_backups() {
            Ok(n) => {
                println!("Removed {} backup(s)", n);
                ExitCode::Success
            }
            Err(e) => store_failure(e),
        };
    }

    let Some(tool) = tool else {
        return fail(ErrorKind::InvalidSpec, "pins prune needs --tool or --backups");
    };

    let mut removed = 0;
    match store.update(|db| removed = db.remove(tool, version)) {
        Ok(_) => {
            println!("Removed {} record(s) for {}", removed, tool);
            ExitCode::Success
        }
        Err(e) => store_failure(e),
    }
}

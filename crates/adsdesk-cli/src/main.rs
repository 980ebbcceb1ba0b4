use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use adsdesk_core::{AppConfig, CollectionEntry, CoreError, Database, ExitCode, SqliteCollection};
use adsdesk_science::{
    AdsClient, ArticleReport, DocumentFetcher, DocumentStatus, Pipeline, PipelineError,
    PipelineOptions, ScienceError,
};

// ─── CLI Definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "adsdesk",
    about = "Add astronomy papers from NASA ADS to a local collection",
    version,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format. Also enabled by setting ADSDESK_JSON=1.
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging.
    #[arg(short, long, global = true)]
    debug: bool,

    /// Config file to use instead of ~/.config/adsdesk/config.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve identifiers (bibcode, DOI, arXiv id, ADS URL or free text) and add them.
    Add {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
        /// Download the document again and replace a different attached file.
        #[arg(long)]
        force_refetch: bool,
        /// Store metadata only.
        #[arg(long)]
        no_pdf: bool,
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// List entries in the collection.
    List {
        #[arg(long, default_value = "50")]
        limit: usize,
        #[arg(long, default_value = "0")]
        offset: usize,
    },

    /// Show one entry by dedup key, bibcode or id.
    Show { key: String },

    /// Config management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the config file path.
    Path,
    /// Show effective config values.
    Show,
    /// Write a default config file if none exists.
    Init {
        #[arg(long)]
        force: bool,
    },
}

// ─── Main ────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let cli = Cli::parse();
    let json_output = cli.json || std::env::var("ADSDESK_JSON").as_deref() == Ok("1");

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);
    let config = AppConfig::load_from(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let log_guard = init_logging(cli.debug || config.options.debug, config.options.log_file.as_deref())?;

    match cli.command {
        Commands::Add {
            ids,
            dry_run,
            force_refetch,
            no_pdf,
            concurrency,
        } => {
            let pipeline = build_pipeline(&config, PipelineOptions {
                download_pdf: config.options.download_pdf && !no_pdf,
                force_refetch,
                dry_run,
                concurrency: concurrency.unwrap_or(config.options.concurrency),
            })?;
            let results = pipeline.process_all(&ids).await;
            let dur = start.elapsed().as_millis();

            let failed = results.iter().filter(|r| r.is_err()).count();
            let network = results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .any(PipelineError::is_network);

            if json_output {
                let items: Vec<_> = results.iter().map(result_json).collect();
                print_json(&serde_json::json!({
                    "status": if failed == 0 { "ok" } else { "partial" },
                    "data": { "items": items, "total": items.len(), "failed": failed, "dry_run": dry_run },
                    "meta": { "duration_ms": dur }
                }))?;
            } else {
                for result in &results {
                    match result {
                        Ok(report) => print_report(report),
                        Err(err) => print_failure(err),
                    }
                }
                if dry_run {
                    println!("(dry run: nothing was written)");
                }
            }

            if failed > 0 {
                let code = if network && failed == results.len() {
                    ExitCode::NetworkError
                } else {
                    ExitCode::Unresolved
                };
                exit_with(code, log_guard);
            }
        }

        Commands::List { limit, offset } => {
            let db = open_db(&config)?;
            let entries = db.list_entries(limit, offset)?;
            let dur = start.elapsed().as_millis();

            if json_output {
                let total = db.count_entries()?;
                print_json(&serde_json::json!({
                    "status": "ok",
                    "data": { "items": entries, "total": total, "limit": limit, "offset": offset },
                    "meta": { "duration_ms": dur }
                }))?;
            } else if entries.is_empty() {
                println!("Collection is empty. Use `adsdesk add` to add papers.");
            } else {
                for entry in &entries {
                    let author = entry.first_author.as_deref().unwrap_or("");
                    let year = entry.year.map(|y| y.to_string()).unwrap_or_default();
                    let file = if entry.has_file { "pdf" } else { "   " };
                    println!(
                        "{key:<20}  {file}  {title:<50}  {author:<20}  {year}",
                        key = entry.dedup_key,
                        title = truncate(&entry.title, 50),
                    );
                }
            }
        }

        Commands::Show { key } => {
            let db = open_db(&config)?;
            let dur = start.elapsed().as_millis();
            match find_entry(&db, &key)? {
                Some(entry) => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":entry,"meta":{"duration_ms":dur}}))?;
                    } else {
                        print_entry(&entry);
                    }
                }
                None => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"error","error":"not_found","message":format!("No entry for {key}"),"meta":{"duration_ms":dur}}))?;
                    } else {
                        eprintln!("No entry for: {key}");
                    }
                    exit_with(ExitCode::NotFound, log_guard);
                }
            }
        }

        // ── Config ─────────────────────────────────────────────────────────

        Commands::Config { action } => {
            let dur = start.elapsed().as_millis();
            match action {
                ConfigAction::Path => {
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":config_path,"exists":config_path.exists()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("{}", config_path.display());
                    }
                }
                ConfigAction::Show => {
                    let mut shown = config.clone();
                    if shown.ads.token.is_some() {
                        shown.ads.token = Some("********".to_string());
                    }
                    let token_found = config.resolve_ads_token().is_some();
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"config":shown,"ads_token_found":token_found,"database_path":config.database_path(),"files_dir":config.files_dir()},"meta":{"duration_ms":dur}}))?;
                    } else {
                        print!("{}", toml::to_string_pretty(&shown)?);
                        println!();
                        println!("# ads token found: {token_found}");
                        println!("# database: {}", config.database_path().display());
                        println!("# files:    {}", config.files_dir().display());
                    }
                }
                ConfigAction::Init { force } => {
                    if config_path.exists() && !force {
                        eprintln!("Config already exists at {} (use --force to overwrite).", config_path.display());
                        exit_with(ExitCode::InvalidArgs, log_guard);
                    }
                    AppConfig::default().save_to(&config_path)?;
                    if json_output {
                        print_json(&serde_json::json!({"status":"ok","data":{"path":config_path},"meta":{"duration_ms":dur}}))?;
                    } else {
                        println!("Wrote default config to {}", config_path.display());
                    }
                }
            }
        }
    }

    Ok(())
}

// ─── Helpers ────────────────────────────────────────────────────────────────

/// Installs the stderr subscriber and, when `log_file` is set, a file layer.
/// The returned guard flushes the file writer on drop.
fn init_logging(debug: bool, log_file: Option<&str>) -> Result<Option<WorkerGuard>> {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            format!("adsdesk_science={default_level},adsdesk_core={default_level},{default_level}").into()
        })
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(filter());

    let Some(log_file) = log_file else {
        tracing_subscriber::registry().with(stderr_layer).init();
        return Ok(None);
    };

    let path = Path::new(log_file);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;
    let file_name = path.file_name().context("log_file must name a file")?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());

    tracing_subscriber::registry().with(stderr_layer).with(file_layer).init();
    Ok(Some(guard))
}

/// `process::exit` skips destructors, so the file writer is flushed first.
fn exit_with(code: ExitCode, log_guard: Option<WorkerGuard>) -> ! {
    drop(log_guard);
    std::process::exit(code as i32);
}

fn build_pipeline(config: &AppConfig, options: PipelineOptions) -> Result<Pipeline> {
    let token = config.resolve_ads_token();
    if token.is_none() {
        tracing::warn!("no ADS API token found; every lookup will fail");
    }
    let ads = AdsClient::from_config(&config.ads, token)?;
    let fetcher = DocumentFetcher::from_config(&config.options, &config.proxy)?;

    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = Arc::new(SqliteCollection::open(config)?);
    Ok(Pipeline::new(ads, fetcher, store, options))
}

fn print_json(val: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(val)?);
    Ok(())
}

fn open_db(config: &AppConfig) -> Result<Database> {
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(Database::open(&db_path)?)
}

fn find_entry(db: &Database, key: &str) -> Result<Option<CollectionEntry>> {
    if let Some(entry) = db.find_entry_by_bibcode_alias(key)? {
        return Ok(Some(entry));
    }
    match db.get_entry(key) {
        Ok(entry) => Ok(Some(entry)),
        Err(CoreError::EntryNotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn result_json(result: &std::result::Result<ArticleReport, PipelineError>) -> serde_json::Value {
    match result {
        Ok(report) => serde_json::json!({"status": "ok", "report": report}),
        Err(err) => {
            let mut value = serde_json::json!({
                "status": "error",
                "input": err.input,
                "stage": err.stage,
                "message": err.source.to_string(),
            });
            if let ScienceError::Ambiguous { candidates, .. } = &err.source {
                value["candidates"] = serde_json::json!(candidates);
            }
            value
        }
    }
}

fn print_report(report: &ArticleReport) {
    println!("{:<9}  {}  {}", report.outcome.to_string(), report.dedup_key, truncate(&report.title, 60));
    match &report.document {
        DocumentStatus::Attached { path, source_url } => {
            println!("           pdf attached via {path}: {source_url}");
        }
        DocumentStatus::AlreadyAttached => println!("           pdf already attached"),
        DocumentStatus::Skipped => {}
        DocumentStatus::Unavailable(unavailable) => {
            println!("           no pdf retrieved:");
            for attempt in &unavailable.attempts {
                let url = attempt.url.as_deref().unwrap_or("-");
                println!("             {}: {} ({url})", attempt.path, attempt.reason);
            }
        }
    }
}

fn print_failure(err: &PipelineError) {
    eprintln!("failed     {}: {} failed: {}", err.input, err.stage, err.source);
    if let ScienceError::Ambiguous { candidates, .. } = &err.source {
        eprintln!("           candidates:");
        for candidate in candidates {
            eprintln!("             {candidate}");
        }
    }
}

fn print_entry(entry: &CollectionEntry) {
    println!("key:      {}", entry.dedup_key);
    if let Some(bibcode) = &entry.bibcode {
        println!("bibcode:  {bibcode}");
    }
    if !entry.alternate_bibcodes.is_empty() {
        println!("aliases:  {}", entry.alternate_bibcodes.join(", "));
    }
    println!("title:    {}", entry.title);
    if let Some(author) = &entry.first_author {
        println!("author:   {author}");
    }
    if let Some(year) = entry.year {
        println!("year:     {year}");
    }
    match &entry.attachment {
        Some(file) if entry.has_live_attachment() => println!("file:     {}", file.path),
        Some(file) => println!("file:     {} (missing)", file.path),
        None => println!("file:     -"),
    }
    for url in &entry.linked_urls {
        println!("link:     {url}");
    }
    if !entry.citation.is_empty() {
        println!();
        println!("{}", entry.citation);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

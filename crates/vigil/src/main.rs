use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use vigil::{AuditSinkConfig, Engine, RootConfig, RootError, TableSource};
use vigil_core::{ClearanceTier, ColumnKey, Principal, RecordId};
use vigil_grid::{
    ExportFormat, FilterState, FilterValue, PageRequest, QueryRequest, SortDescriptor,
    TableSession,
};

/// Vigil: guarded tabular data engine
///
/// Columns are scoped by clearance, sensitive values stay masked until
/// revealed, and every disclosure is audited.
#[derive(Parser, Debug)]
#[command(name = "vigil", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file
    Init,

    /// Query a record source and print one page as JSON
    Query {
        #[command(flatten)]
        view: ViewArgs,

        /// Zero-based page index
        #[arg(long, default_value = "0")]
        page: usize,

        /// Page size (defaults to the configured page size)
        #[arg(long)]
        size: Option<usize>,
    },

    /// Export matching or selected records
    Export {
        #[command(flatten)]
        view: ViewArgs,

        /// Output format: csv, xlsx or pdf
        #[arg(long, default_value = "csv")]
        format: ExportFormat,

        /// Record ids to select. With --all, these are excluded instead.
        #[arg(long = "select")]
        select: Vec<String>,

        /// Select every matching record
        #[arg(long)]
        all: bool,
    },

    /// Show recent audit log entries
    Audit {
        /// JSON-lines audit log (defaults to the configured sink)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Maximum number of entries to display
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Args, Debug)]
struct ViewArgs {
    /// JSON file with columns and records
    #[arg(long)]
    source: PathBuf,

    /// Acting principal id
    #[arg(long)]
    principal: String,

    /// Clearance granted to the principal
    #[arg(long, default_value = "public")]
    clearance: ClearanceTier,

    /// Global search text
    #[arg(long)]
    search: Option<String>,

    /// Column filter as key=value (substring match)
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,

    /// Sort as key, key:asc or key:desc
    #[arg(long)]
    sort: Option<SortDescriptor>,

    /// Sensitive columns to reveal before querying
    #[arg(long = "reveal")]
    reveal: Vec<String>,

    /// Activate emergency mode as this principal first
    #[arg(long)]
    emergency: bool,
}

fn parse_filter(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=value, got '{}'", s)),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "vigil=debug,vigil_core=debug,vigil_policy=debug,vigil_audit=debug,\
             vigil_emergency=debug,vigil_grid=debug",
        )
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vigil=info"))
    };

    // Stdout carries command output, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<RootConfig, RootError> {
    match path {
        Some(p) => RootConfig::load(p),
        None => {
            let default_path = RootConfig::default_config_path();
            RootConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e.user_message());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), RootError> {
    match cli.command {
        Commands::Init => cmd_init(cli.config.as_ref()),
        Commands::Query { view, page, size } => {
            cmd_query(cli.config.as_ref(), &view, page, size)
        }
        Commands::Export {
            view,
            format,
            select,
            all,
        } => cmd_export(cli.config.as_ref(), &view, format, &select, all),
        Commands::Audit { log, limit } => cmd_audit(cli.config.as_ref(), log, limit),
    }
}

fn cmd_init(config_path: Option<&PathBuf>) -> Result<(), RootError> {
    let config = load_config(config_path)?;
    let save_path = config_path
        .cloned()
        .unwrap_or_else(RootConfig::default_config_path);
    config.save(&save_path)?;

    info!(path = %save_path.display(), "wrote configuration");
    println!("Vigil initialized.");
    println!("  Config: {}", save_path.display());
    Ok(())
}

/// Build the engine, apply the emergency flag, open a session and reveal
/// the requested columns.
fn open_view(
    config_path: Option<&PathBuf>,
    view: &ViewArgs,
) -> Result<(Engine, TableSource, TableSession), RootError> {
    let config = load_config(config_path)?;
    let engine = Engine::new(config)?;
    let source = TableSource::load(&view.source)?;
    let principal = Principal::new(view.principal.as_str(), view.clearance);

    if view.emergency {
        engine.activate_emergency(&principal)?;
    }

    let mut session = engine.open_session(source.columns.clone(), principal)?;
    for key in &view.reveal {
        session.reveal(&ColumnKey::new(key.as_str()))?;
    }
    Ok((engine, source, session))
}

fn build_request(view: &ViewArgs, page: PageRequest) -> QueryRequest {
    let mut filter = FilterState::new();
    if let Some(search) = &view.search {
        filter = filter.with_search(search.as_str());
    }
    for (key, value) in &view.filters {
        filter = filter.with_filter(key.as_str(), FilterValue::Contains(value.clone()));
    }

    let mut request = QueryRequest::new(page).with_filter(filter);
    if let Some(sort) = &view.sort {
        request = request.with_sort(sort.clone());
    }
    request
}

fn cmd_query(
    config_path: Option<&PathBuf>,
    view: &ViewArgs,
    page: usize,
    size: Option<usize>,
) -> Result<(), RootError> {
    let (engine, source, mut session) = open_view(config_path, view)?;
    let size = size.unwrap_or(engine.config().query.default_page_size);
    let request = build_request(view, PageRequest::new(page, size));

    let result = session.query(&source.records, request)?;
    let output = serde_json::json!({
        "sessionId": session.id(),
        "page": result,
        "totalCount": source.total_count.unwrap_or(source.records.len()),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cmd_export(
    config_path: Option<&PathBuf>,
    view: &ViewArgs,
    format: ExportFormat,
    select: &[String],
    all: bool,
) -> Result<(), RootError> {
    let (engine, source, mut session) = open_view(config_path, view)?;

    // Export reuses the session's last filter and sort.
    let page = PageRequest::first(engine.config().query.default_page_size);
    session.query(&source.records, build_request(view, page))?;

    if all {
        session.select_all()?;
    }
    for id in select {
        session.toggle_selection(RecordId::new(id.as_str()))?;
    }

    let payload = session.export(&source.records, format)?;
    match format {
        ExportFormat::Csv => print!("{}", payload.to_csv()),
        _ => println!("{}", serde_json::to_string_pretty(&payload)?),
    }
    Ok(())
}

fn cmd_audit(
    config_path: Option<&PathBuf>,
    log: Option<PathBuf>,
    limit: usize,
) -> Result<(), RootError> {
    let path = match log {
        Some(path) => path,
        None => match load_config(config_path)?.audit.sink {
            AuditSinkConfig::Jsonl { path } => path,
            AuditSinkConfig::Memory => {
                return Err(RootError::Config(
                    "the configured audit sink is in-memory; pass --log <path>".into(),
                ))
            }
        },
    };

    let events = vigil_audit::read_events(&path)?;
    println!("Audit Log ({} entries):", events.len());
    if events.is_empty() {
        println!("  (no entries)");
    }
    let skip = events.len().saturating_sub(limit);
    for event in &events[skip..] {
        println!("  {}", serde_json::to_string(event)?);
    }
    Ok(())
}

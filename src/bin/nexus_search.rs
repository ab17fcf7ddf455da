use clap::{Parser, Subcommand};
use nexus_search::{ConnectorConfig, ModelSchema, logger, query::parse_filter_json};
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "nexus-search", version, about = "Search-engine connector CLI", long_about = None)]
struct Cli {
    #[arg(long, help = "Path to a config file (TOML). Falls back to NEXUS_SEARCH_CONFIG, ./nexus_search.toml, the user config dir")]
    config: Option<PathBuf>,
    #[arg(long, help = "log4rs YAML file; otherwise NEXUS_SEARCH_LOG_* variables are used when set")]
    log_config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Print the backend request a filter translates to")]
    Translate {
        #[arg(long, help = "Model schema file (TOML with a [model] table)")]
        schema: PathBuf,
        #[arg(long, default_value = "{}", help = "Filter as JSON, or @path to read it from a file")]
        filter: String,
    },
    #[command(about = "Print the index creation body derived from a schema")]
    Mapping {
        #[arg(long, help = "Model schema file (TOML with a [model] table)")]
        schema: PathBuf,
    },
    #[command(about = "Load NDJSON records into an in-memory index and run a filter")]
    Query {
        #[arg(long, help = "Model schema file (TOML with a [model] table)")]
        schema: PathBuf,
        #[arg(long, help = "NDJSON file, one record per line")]
        data: PathBuf,
        #[arg(long, default_value = "{}", help = "Filter as JSON, or @path to read it from a file")]
        filter: String,
        #[arg(long, help = "Print the number of matches instead of the records")]
        count: bool,
    },
    #[command(about = "Print the effective connector configuration")]
    Config,
    #[command(about = "Print version and compiled features")]
    Info,
}

fn read_arg(raw: &str) -> Result<String, Box<dyn std::error::Error>> {
    match raw.strip_prefix('@') {
        Some(path) => Ok(std::fs::read_to_string(path)?),
        None => Ok(raw.to_string()),
    }
}

fn init_logging(cli: &Cli) {
    let res = match &cli.log_config {
        Some(p) => logger::init_path(p),
        None if std::env::var_os("NEXUS_SEARCH_LOG_DIR").is_some() => logger::configure_from_env(),
        None => Ok(()),
    };
    if let Err(e) = res {
        eprintln!("warning: logging disabled: {e}");
    }
}

fn translate(cfg: &ConnectorConfig, schema: &Path, filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    let schema = ModelSchema::from_toml_path(schema)?;
    let filter = parse_filter_json(&read_arg(filter)?, &schema)?;
    let index = cfg.index_for(&schema);
    let builder = nexus_search::query::QueryBuilder::new(&schema, &index, cfg.max_result_window);
    let request = match (&filter.native, &filter.suggests) {
        (Some(native), _) => builder.build_native(native),
        (None, Some(spec)) => builder.build_suggest(spec),
        (None, None) => builder.build(&filter)?,
    };
    let out = serde_json::json!({ "index": request.index, "body": request.body });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn mapping(cfg: &ConnectorConfig, schema: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let schema = ModelSchema::from_toml_path(schema)?;
    let out = serde_json::json!({ "index": cfg.index_for(&schema), "body": schema.index_mapping() });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

async fn run_query(
    cfg: ConnectorConfig,
    schema: &Path,
    data: &Path,
    filter: &str,
    count: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let schema = ModelSchema::from_toml_path(schema)?;
    let connector = nexus_search::in_memory(schema, cfg)?;
    connector.ensure_index().await?;
    let reader = std::io::BufReader::new(std::fs::File::open(data)?);
    let mut loaded = 0usize;
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Value::Object(record) = serde_json::from_str::<Value>(&line)? else {
            return Err(format!("line {}: expected a JSON object", n + 1).into());
        };
        connector.create(record).await?;
        loaded += 1;
    }
    connector.backend().refresh(connector.index()).await?;
    log::info!("query: loaded {loaded} records into {}", connector.index());

    let filter = connector.filter(&serde_json::from_str(&read_arg(filter)?)?)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if count {
        writeln!(out, "{}", connector.count(&filter.condition).await?)?;
    } else {
        for record in connector.find(&filter).await? {
            writeln!(out, "{}", serde_json::to_string(&record)?)?;
        }
    }
    Ok(())
}

fn info() {
    println!("nexus-search {}", env!("CARGO_PKG_VERSION"));
    let features = nexus_search::compiled_features();
    println!("features: {}", if features.is_empty() { "none".to_string() } else { features.join(", ") });
    println!("backends: memory{}", if cfg!(feature = "elasticsearch") { ", elasticsearch" } else { "" });
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(&cli);
    let cfg = match ConnectorConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };
    let res = match &cli.command {
        Commands::Translate { schema, filter } => translate(&cfg, schema, filter),
        Commands::Mapping { schema } => mapping(&cfg, schema),
        Commands::Query { schema, data, filter, count } => run_query(cfg, schema, data, filter, *count).await,
        Commands::Config => toml::to_string_pretty(&cfg).map(|s| print!("{s}")).map_err(Into::into),
        Commands::Info => {
            info();
            Ok(())
        }
    };
    if let Err(e) = res {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

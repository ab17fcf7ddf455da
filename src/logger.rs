use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::error::Error;
use std::path::{Path, PathBuf};

/// Target carrying every backend request the connector sends.
pub const QUERY_TARGET: &str = "nexus_search::query";
/// Target of the `devlog!` macro.
pub const DEV_TARGET: &str = "nexus_search::dev";

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
const ROLL_SIZE: u64 = 10 * 1024 * 1024;

/// Initializes logging from `log4rs.yaml` in the working directory.
pub fn init() -> Result<(), Box<dyn Error>> {
    log4rs::init_file("log4rs.yaml", log4rs::config::Deserializers::default())?;
    Ok(())
}

/// Initializes logging from a specific log4rs config file.
pub fn init_path(path: &Path) -> Result<(), Box<dyn Error>> {
    log4rs::init_file(path, log4rs::config::Deserializers::default())?;
    Ok(())
}

#[must_use]
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, Box<dyn Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Builds the rolling-file configuration without installing it.
/// - `app.log` gets the root logger at `level`
/// - `query.log` gets [`QUERY_TARGET`] when `query_log` is set
/// - `dev.log` gets [`DEV_TARGET`] when `dev_log` is set
///
/// # Errors
/// Fails when the directory or a log file cannot be created.
pub fn build_config(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<u32>,
    query_log: bool,
    dev_log: bool,
) -> Result<Config, Box<dyn Error>> {
    let base = match dir {
        Some(d) => PathBuf::from(d),
        None => std::env::current_dir()?,
    };
    std::fs::create_dir_all(&base)?;
    let keep = retention.unwrap_or(7);
    let lvl = parse_level(level.unwrap_or("info"));

    let mut builder = Config::builder().appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)));
    builder = if query_log {
        builder
            .appender(Appender::builder().build("query", Box::new(rolling(&base, "query", keep)?)))
            .logger(Logger::builder().appender("query").additive(false).build(QUERY_TARGET, LevelFilter::Debug))
    } else {
        builder.logger(Logger::builder().additive(false).build(QUERY_TARGET, LevelFilter::Off))
    };
    builder = if dev_log {
        builder
            .appender(Appender::builder().build("dev", Box::new(rolling(&base, "dev", keep)?)))
            .logger(Logger::builder().appender("dev").additive(false).build(DEV_TARGET, LevelFilter::Trace))
    } else {
        builder.logger(Logger::builder().additive(false).build(DEV_TARGET, LevelFilter::Off))
    };
    Ok(builder.build(Root::builder().appender("app").build(lvl))?)
}

/// Configures process-wide logging. A second call keeps the first configuration.
pub fn configure_logging(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<u32>,
    query_log: bool,
) -> Result<(), Box<dyn Error>> {
    let dev_log = env_flag("NEXUS_SEARCH_DEV_LOG");
    let config = build_config(dir, level, retention, query_log, dev_log)?;
    if log4rs::init_config(config).is_err() {
        log::debug!("logger already initialized, keeping existing configuration");
    }
    Ok(())
}

/// Configures logging from `NEXUS_SEARCH_LOG_DIR`, `NEXUS_SEARCH_LOG_LEVEL`,
/// `NEXUS_SEARCH_LOG_RETENTION` and `NEXUS_SEARCH_QUERY_LOG`.
pub fn configure_from_env() -> Result<(), Box<dyn Error>> {
    let dir = std::env::var("NEXUS_SEARCH_LOG_DIR").ok().map(PathBuf::from);
    let level = std::env::var("NEXUS_SEARCH_LOG_LEVEL").ok();
    let retention = std::env::var("NEXUS_SEARCH_LOG_RETENTION").ok().and_then(|s| s.parse::<u32>().ok());
    configure_logging(dir.as_deref(), level.as_deref(), retention, env_flag("NEXUS_SEARCH_QUERY_LOG"))
}

fn env_flag(key: &str) -> bool {
    std::env::var(key).is_ok_and(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

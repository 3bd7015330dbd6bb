//! dbwatch: database runtime-state monitor.
//!
//! Runs a single performance check by default, or keeps checking every
//! `--interval` seconds with `--watch`.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{Level, error, info, warn};
use tracing_subscriber::EnvFilter;

use dbwatch_core::collector::{Connector, Driver, NativeDriver};
use dbwatch_core::config::{ConnectionConfig, Dialect, MonitorSettings, Thresholds};
use dbwatch_core::fmt::format_duration;
use dbwatch_core::monitor::{Monitor, ShutdownSignal};
use dbwatch_core::notify::{ChannelNotifier, LogNotifier};
use dbwatch_core::{MonitorError, report};

#[derive(Parser, Debug)]
#[command(
    name = "dbwatch",
    about = "Database performance monitor for PostgreSQL and MySQL",
    version
)]
struct Args {
    /// Database type: postgresql or mysql.
    #[arg(long, default_value = "postgresql", env = "DBWATCH_DIALECT")]
    dialect: String,

    /// Server host. Defaults to PGHOST / MYSQL_HOST, then localhost.
    #[arg(long, env = "DBWATCH_HOST")]
    host: Option<String>,

    /// Server port. Defaults to PGPORT / MYSQL_TCP_PORT, then the dialect's port.
    #[arg(long, env = "DBWATCH_PORT")]
    port: Option<u16>,

    /// Database name.
    #[arg(long, env = "DBWATCH_DATABASE")]
    database: Option<String>,

    /// User name.
    #[arg(long, env = "DBWATCH_USER")]
    user: Option<String>,

    /// Password. Prefer the environment over the command line.
    #[arg(long, env = "DBWATCH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Keep checking until interrupted instead of running a single check.
    #[arg(short, long)]
    watch: bool,

    /// Seconds between checks in watch mode.
    #[arg(short, long, default_value = "60", env = "DBWATCH_INTERVAL")]
    interval: u64,

    /// Stop watching after this many seconds.
    #[arg(short, long, env = "DBWATCH_DURATION")]
    duration: Option<u64>,

    /// Minimum running time (ms) for a session to count as slow.
    #[arg(long, default_value = "1000")]
    slow_query_ms: u64,

    /// Slow queries running longer than this (ms) raise an alert.
    #[arg(long, default_value = "5000")]
    very_slow_query_ms: f64,

    /// Alert when more connections than this are active.
    #[arg(long, default_value = "100")]
    max_active_connections: i64,

    /// Alert when the cache hit ratio (percent) drops below this.
    #[arg(long, default_value = "95")]
    min_cache_hit_ratio: f64,

    /// Print the result as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn connection_config(&self, dialect: Dialect) -> ConnectionConfig {
        let mut config = ConnectionConfig::from_env(dialect);
        if let Some(ref host) = self.host {
            config = config.with_host(host.as_str());
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(ref database) = self.database {
            config = config.with_database(database.as_str());
        }
        if let Some(ref user) = self.user {
            config = config.with_user(user.as_str());
        }
        if let Some(ref password) = self.password {
            config = config.with_password(password.as_str());
        }
        config
    }

    fn settings(&self) -> MonitorSettings {
        MonitorSettings {
            interval: Duration::from_secs(self.interval),
            duration: self.duration.map(Duration::from_secs),
            thresholds: Thresholds {
                slow_query_ms: self.slow_query_ms,
                very_slow_query_ms: self.very_slow_query_ms,
                max_active_connections: self.max_active_connections,
                min_cache_hit_ratio: self.min_cache_hit_ratio,
            },
        }
    }
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for target in ["dbwatch", "dbwatch_core"] {
        if let Ok(directive) = format!("{}={}", target, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Runs the monitor described by `args` and returns the process exit code.
fn execute<D: Driver>(
    args: &Args,
    driver: D,
    shutdown: &ShutdownSignal,
    out: &mut impl Write,
) -> u8 {
    let dialect = match args.dialect.parse::<Dialect>() {
        Ok(d) => d,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let config = args.connection_config(dialect);
    info!("dbwatch {} starting", dbwatch_core::VERSION);
    info!("Config: {:?}", config);

    let notifier = ChannelNotifier::new().with_channel(LogNotifier);
    let connector = Connector::with_driver(config, driver);
    let mut monitor = match Monitor::new(connector, notifier, args.settings()) {
        Ok(m) => m,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    if args.watch {
        let settings = monitor.settings();
        info!(
            "Watch mode: interval={}, duration={}",
            format_duration(settings.interval),
            settings
                .duration
                .map_or_else(|| "unbounded".to_string(), format_duration)
        );
        match monitor.run(shutdown) {
            Ok(run) => {
                info!("Stopped after {} check(s): {:?}", run.checks, run.reason);
                if args.json {
                    emit_json(out, &run);
                }
                0
            }
            Err(e) => fail(dialect, &e),
        }
    } else {
        match monitor.run_once() {
            Ok(summary) => {
                if args.json {
                    emit_json(out, &summary);
                } else if let Err(e) = writeln!(out, "{}", report::render_summary(&summary)) {
                    warn!("Failed to write summary: {}", e);
                }
                0
            }
            Err(e) => fail(dialect, &e),
        }
    }
}

fn emit_json(out: &mut impl Write, value: &impl serde::Serialize) {
    let written = serde_json::to_string_pretty(value)
        .map_err(|e| e.to_string())
        .and_then(|json| writeln!(out, "{}", json).map_err(|e| e.to_string()));
    if let Err(e) = written {
        warn!("Failed to write JSON output: {}", e);
    }
}

fn fail(dialect: Dialect, err: &MonitorError) -> u8 {
    error!("{}", err);
    if let MonitorError::Connection(msg) = err {
        print_connection_hint(dialect, msg);
    }
    1
}

/// Prints a colored connection error with configuration hints.
fn print_connection_hint(dialect: Dialect, error: &str) {
    const RED: &str = "\x1b[1;31m";
    const YELLOW: &str = "\x1b[33m";
    const RESET: &str = "\x1b[0m";

    eprintln!("{RED}{dialect}: {error}{RESET}");
    eprintln!();
    eprintln!("{YELLOW}  Configure connection with environment variables:");
    match dialect {
        Dialect::Postgresql => {
            eprintln!("    export PGHOST=localhost");
            eprintln!("    export PGPORT=5432");
            eprintln!("    export PGUSER=postgres");
            eprintln!("    export PGPASSWORD=secret");
            eprintln!("    export PGDATABASE=postgres");
        }
        Dialect::Mysql => {
            eprintln!("    export MYSQL_HOST=localhost");
            eprintln!("    export MYSQL_TCP_PORT=3306");
            eprintln!("    export USER=root");
            eprintln!("    export MYSQL_PWD=secret");
        }
    }
    eprintln!("  or pass --host, --port, --user, --password, --database.{RESET}");
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let shutdown = ShutdownSignal::new();
    let signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        signal.trigger();
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    let mut stdout = std::io::stdout().lock();
    ExitCode::from(execute(&args, NativeDriver, &shutdown, &mut stdout))
}

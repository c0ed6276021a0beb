// # outaged - Connectivity Outage Prober Daemon
//
// The outaged daemon is a thin integration layer. It is responsible for:
// 1. Parsing the command line
// 2. Initializing diagnostics and the tokio runtime
// 3. Opening the event log and the raw ICMP socket
// 4. Running the monitor engine until a termination signal arrives
//
// All probing logic lives in outage-core.
//
// ## Usage
//
// ```bash
// outaged 192.0.2.1,198.51.100.7 --log /var/log/
// outaged --ip 192.0.2.1 --ip 203.0.113.9 --match-policy identifier
// ```
//
// Events are appended to `<log dir>/bg-ping.log`. Opening the raw socket
// needs root or CAP_NET_RAW.
//
// ## Environment
//
// - `OUTAGE_LOG_DIR`: Log directory (default `/var/log/`)
// - `OUTAGE_LOG_LEVEL`: Diagnostic level: trace, debug, info, warn, error

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use outage_core::sink::{FileSink, timestamp};
use outage_core::traits::EventSink;
use outage_core::{
    IdentifierStrategy, MatchPolicy, MonitorConfig, MonitorEngine, MonitorEvent, parse_targets,
};
use outage_icmp::IcmpSocket;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the engine gets to stop after a signal
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown (also `--help` and `--ver`)
/// - 1: Configuration or startup error
/// - 2: Runtime error (e.g. the event log became unwritable)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutagedExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<OutagedExitCode> for ExitCode {
    fn from(code: OutagedExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Background ICMP connectivity outage prober
#[derive(Debug, Parser)]
#[command(name = "outaged", disable_version_flag = true)]
struct Cli {
    /// Remote IPv4 address(es) to monitor, comma separated and/or repeated
    #[arg(value_name = "IP")]
    targets: Vec<String>,

    /// Additional remote IPv4 address(es), comma separated
    #[arg(long = "ip", value_name = "IP[,IP...]")]
    ip: Vec<String>,

    /// Directory that holds bg-ping.log
    #[arg(long, env = "OUTAGE_LOG_DIR", default_value = "/var/log/")]
    log: PathBuf,

    /// Diagnostic log level
    #[arg(long, env = "OUTAGE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// How echo identifiers are assigned
    #[arg(long, value_enum, default_value_t = IdentifierArg::Sequential)]
    identifiers: IdentifierArg,

    /// Which reply fields must match the outstanding request
    #[arg(long, value_enum, default_value_t = MatchPolicyArg::Strict)]
    match_policy: MatchPolicyArg,

    /// Drop replies that do not come from the probed address
    #[arg(long)]
    verify_source: bool,

    /// Print version information and exit
    #[arg(long)]
    ver: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum IdentifierArg {
    Sequential,
    Random,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MatchPolicyArg {
    /// Identifier and sequence
    Strict,
    /// Identifier only
    Identifier,
}

impl Cli {
    /// Positional and `--ip` targets together
    fn target_args(&self) -> Vec<&str> {
        self.targets
            .iter()
            .chain(self.ip.iter())
            .map(String::as_str)
            .collect()
    }

    /// Build the monitor configuration
    fn monitor_config(&self) -> Result<MonitorConfig> {
        let targets = parse_targets(&self.target_args())?;

        let identifiers = match self.identifiers {
            IdentifierArg::Sequential => IdentifierStrategy::Sequential,
            IdentifierArg::Random => IdentifierStrategy::Random,
        };
        let match_policy = match self.match_policy {
            MatchPolicyArg::Strict => MatchPolicy::IdentifierAndSequence,
            MatchPolicyArg::Identifier => MatchPolicy::IdentifierOnly,
        };

        let config = MonitorConfig::new(targets)
            .with_identifiers(identifiers)
            .with_match_policy(match_policy)
            .with_verify_source(self.verify_source);
        config.validate()?;

        Ok(config)
    }

    fn tracing_level(&self) -> Result<Level> {
        match self.log_level.to_lowercase().as_str() {
            "trace" => Ok(Level::TRACE),
            "debug" => Ok(Level::DEBUG),
            "info" => Ok(Level::INFO),
            "warn" => Ok(Level::WARN),
            "error" => Ok(Level::ERROR),
            _ => anyhow::bail!(
                "OUTAGE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }
    }
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    OutagedExitCode::CleanShutdown
                }
                _ => OutagedExitCode::ConfigError,
            };
            let _ = e.print();
            return code.into();
        }
    };

    if cli.ver {
        println!("Version: {}", env!("CARGO_PKG_VERSION"));
        return OutagedExitCode::CleanShutdown.into();
    }

    let config = match cli.monitor_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return OutagedExitCode::ConfigError.into();
        }
    };

    let log_level = match cli.tracing_level() {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return OutagedExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return OutagedExitCode::ConfigError.into();
    }

    info!("Starting outaged daemon");
    info!("Configuration loaded: {} target(s)", config.targets.len());

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return OutagedExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config, cli.log)).into()
}

/// Run the daemon
async fn run_daemon(config: MonitorConfig, log_dir: PathBuf) -> OutagedExitCode {
    let sink = match FileSink::create(&log_dir).await {
        Ok(sink) => Arc::new(sink),
        Err(e) => {
            error!("Failed to open event log: {}", e);
            return OutagedExitCode::ConfigError;
        }
    };
    info!("Recording events to {}", sink.path().display());

    let transport = match IcmpSocket::open() {
        Ok(socket) => Arc::new(socket),
        Err(e) => {
            error!("{}", e);
            let message = format!("Failed to open icmp socket: {}", e);
            if let Err(e) = sink.record(&message, &timestamp()).await {
                error!("Failed to record startup failure: {}", e);
            }
            return OutagedExitCode::ConfigError;
        }
    };

    let (engine, _events) = match MonitorEngine::new(transport, sink.clone(), config) {
        Ok(created) => created,
        Err(e) => {
            error!("Failed to build monitor engine: {}", e);
            return OutagedExitCode::ConfigError;
        }
    };
    info!("Probe identifiers: {:?}", engine.identifiers());

    let recorder = engine.recorder();
    let shutdown = CancellationToken::new();
    let mut engine_task = tokio::spawn(engine.run(shutdown.clone()));

    let signal = tokio::select! {
        joined = &mut engine_task => return engine_exit(joined),
        signal = wait_for_shutdown() => signal,
    };

    let signal = match signal {
        Ok(signal) => signal,
        Err(e) => {
            error!("Shutdown error: {}", e);
            shutdown.cancel();
            return OutagedExitCode::RuntimeError;
        }
    };

    info!("Received shutdown signal: {}", signal);
    if let Err(e) = recorder
        .record(MonitorEvent::SignalCaught {
            signal: signal.to_string(),
        })
        .await
    {
        error!("Failed to record shutdown: {}", e);
        shutdown.cancel();
        return OutagedExitCode::RuntimeError;
    }

    shutdown.cancel();
    let code = match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut engine_task).await {
        Ok(joined) => engine_exit(joined),
        Err(_) => {
            warn!("Engine did not stop within {:?}, aborting", SHUTDOWN_TIMEOUT);
            engine_task.abort();
            OutagedExitCode::RuntimeError
        }
    };

    if let Err(e) = sink.flush().await {
        error!("Failed to flush event log: {}", e);
        return OutagedExitCode::RuntimeError;
    }

    info!("Shutting down daemon");
    code
}

/// Map the engine task's result to an exit code
fn engine_exit(
    joined: Result<outage_core::Result<()>, tokio::task::JoinError>,
) -> OutagedExitCode {
    match joined {
        Ok(Ok(())) => OutagedExitCode::CleanShutdown,
        Ok(Err(e)) => {
            error!("Monitoring failed: {}", e);
            OutagedExitCode::RuntimeError
        }
        Err(e) => {
            error!("Monitor engine task failed: {}", e);
            OutagedExitCode::RuntimeError
        }
    }
}

/// Wait for a termination signal (SIGHUP, SIGINT, SIGTERM, SIGQUIT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sighup = signal(SignalKind::hangup())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGHUP handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigquit = signal(SignalKind::quit())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGQUIT handler: {}", e))?;

    let name = tokio::select! {
        _ = sighup.recv() => "SIGHUP",
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };

    Ok(name)
}

/// Wait for a termination signal (CTRL-C only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

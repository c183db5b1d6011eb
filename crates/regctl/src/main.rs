// # regctl - regstore operator tool
//
// This is a thin integration layer: it reads configuration from the
// environment, builds the store, timer service and manager from
// regstore-core, and runs one command. All registration logic lives in
// regstore-core.
//
// ## Commands
//
// - `regctl show <aor>`: print the AoR as seen by a reader (expired
//   bindings already dropped)
// - `regctl reap <aor>`: persist lazy expiry for the AoR
// - `regctl deregister <aor> <binding-id>`: remove one binding
// - `regctl watch`: reap on each timer pop read from stdin, one JSON object
//   per line (`{"aor_key": "...", "timer_id": "..."}`), until EOF or Ctrl-C
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Store
// - `REGSTORE_STORE_TYPE`: Type of store (file, memory)
// - `REGSTORE_STORE_PATH`: Path to store file (for file store)
// - `REGSTORE_STORE_TIMEOUT_MS`: Bound on each store call
//
// ### Timer service
// - `REGSTORE_TIMER_URL`: Base URL of the timer service
// - `REGSTORE_CALLBACK_URI`: URI the timer service calls back
// - `REGSTORE_TIMER_TIMEOUT_MS`: Bound on each timer call
//
// ### Retries
// - `REGSTORE_MAX_ATTEMPTS`: Attempts per command on version conflicts
//
// ## Example
//
// ```bash
// export REGSTORE_STORE_TYPE=file
// export REGSTORE_STORE_PATH=/var/lib/regstore/records.json
// export REGSTORE_TIMER_URL=http://127.0.0.1:7253
// export REGSTORE_CALLBACK_URI=http://127.0.0.1:9888/timers
//
// regctl deregister sip:alice@example.com '<urn:uuid:f81d4fae-7dec-11d0-a765-00a0c91e6bf6>:1'
// ```

use anyhow::Result;
use regstore_core::config::{
    ManagerConfig, ReaperConfig, RegistrarConfig, StoreConfig, TimerServiceConfig,
};
use regstore_core::store::{FileKvStore, MemoryKvStore};
use regstore_core::traits::KvStore;
use regstore_core::{Aor, Reaper, RegistrationManager, TimerPop};
use regstore_timer_http::HttpTimerService;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// Exit codes for different termination scenarios
///
/// - 0: Command succeeded
/// - 1: Configuration or usage error
/// - 2: Runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegctlExitCode {
    /// Command succeeded
    Success = 0,
    /// Configuration error or bad arguments
    ConfigError = 1,
    /// Runtime error (store, corrupt record, lost races)
    RuntimeError = 2,
}

impl From<RegctlExitCode> for ExitCode {
    fn from(code: RegctlExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Command to run
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Show { aor: String },
    Reap { aor: String },
    Deregister { aor: String, binding_id: String },
    Watch,
}

impl Command {
    /// Parse the command line (without the program name)
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["show", aor] => Ok(Command::Show {
                aor: aor.to_string(),
            }),
            ["reap", aor] => Ok(Command::Reap {
                aor: aor.to_string(),
            }),
            ["deregister", aor, binding_id] => Ok(Command::Deregister {
                aor: aor.to_string(),
                binding_id: binding_id.to_string(),
            }),
            ["watch"] => Ok(Command::Watch),
            _ => anyhow::bail!(
                "usage: regctl show <aor> | reap <aor> | deregister <aor> <binding-id> | watch"
            ),
        }
    }
}

/// Application configuration
struct Config {
    store_type: String,
    store_path: Option<String>,
    store_timeout_ms: Option<u64>,
    timer_url: String,
    callback_uri: String,
    timer_timeout_ms: Option<u64>,
    max_attempts: Option<usize>,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            store_type: env::var("REGSTORE_STORE_TYPE").unwrap_or_else(|_| "file".to_string()),
            store_path: env::var("REGSTORE_STORE_PATH").ok(),
            store_timeout_ms: parse_var("REGSTORE_STORE_TIMEOUT_MS")?,
            timer_url: env::var("REGSTORE_TIMER_URL")?,
            callback_uri: env::var("REGSTORE_CALLBACK_URI")?,
            timer_timeout_ms: parse_var("REGSTORE_TIMER_TIMEOUT_MS")?,
            max_attempts: parse_var("REGSTORE_MAX_ATTEMPTS")?,
            log_level: env::var("REGSTORE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()),
        })
    }

    /// Validate the variables that don't map onto RegistrarConfig
    fn validate(&self) -> Result<()> {
        match self.store_type.as_str() {
            "file" => {
                if self.store_path.as_ref().is_none_or(|p| p.is_empty()) {
                    anyhow::bail!(
                        "REGSTORE_STORE_PATH is required when REGSTORE_STORE_TYPE=file. \
                        Set it via: export REGSTORE_STORE_PATH=/var/lib/regstore/records.json"
                    );
                }
            }
            "memory" => {}
            _ => anyhow::bail!(
                "REGSTORE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.store_type
            ),
        }

        if let Some(max_attempts) = self.max_attempts
            && (max_attempts == 0 || max_attempts > 10)
        {
            anyhow::bail!(
                "REGSTORE_MAX_ATTEMPTS must be between 1 and 10. Got: {}",
                max_attempts
            );
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "REGSTORE_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    /// Build the library configuration
    fn registrar_config(&self) -> RegistrarConfig {
        let store = match self.store_type.as_str() {
            "file" => StoreConfig::File {
                path: self.store_path.clone().unwrap_or_default(),
            },
            _ => StoreConfig::Memory,
        };

        let mut manager = ManagerConfig::default();
        if let Some(ms) = self.store_timeout_ms {
            manager.store_timeout_ms = ms;
        }
        if let Some(ms) = self.timer_timeout_ms {
            manager.timer_timeout_ms = ms;
        }

        let mut reaper = ReaperConfig::default();
        if let Some(max_attempts) = self.max_attempts {
            reaper.max_attempts = max_attempts;
        }

        let http_timeout_ms = manager.timer_timeout_ms;
        RegistrarConfig {
            store,
            timer_service: TimerServiceConfig::Http {
                base_url: self.timer_url.clone(),
                callback_uri: self.callback_uri.clone(),
                timeout_ms: http_timeout_ms,
            },
            manager,
            reaper,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is not a valid number ({}): {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match Command::parse(&args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return RegctlExitCode::ConfigError.into();
        }
    };

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RegctlExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return RegctlExitCode::ConfigError.into();
    }

    let registrar_config = config.registrar_config();
    if let Err(e) = registrar_config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return RegctlExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RegctlExitCode::ConfigError.into();
    }

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RegctlExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run(registrar_config, command).await {
            Ok(()) => RegctlExitCode::Success,
            Err(e) => {
                error!("Command failed: {}", e);
                eprintln!("Error: {}", e);
                RegctlExitCode::RuntimeError
            }
        }
    })
    .into()
}

async fn build_store(config: &StoreConfig) -> Result<Box<dyn KvStore>> {
    Ok(match config {
        StoreConfig::Memory => {
            warn!("Using in-memory store; records do not outlive this command");
            Box::new(MemoryKvStore::new())
        }
        StoreConfig::File { path } => Box::new(FileKvStore::new(path).await?),
    })
}

/// Run one command
async fn run(config: RegistrarConfig, command: Command) -> Result<()> {
    let store = build_store(&config.store).await?;
    let timers = HttpTimerService::from_config(&config.timer_service)?;
    let (manager, mut events) = RegistrationManager::new(store, Box::new(timers), config.manager)?;
    let manager = Arc::new(manager);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Registration event: {:?}", event);
        }
    });

    match command {
        Command::Show { aor } => {
            let pair = manager.get_aor_data(&aor).await?;
            println!("{}", serde_json::to_string_pretty(&describe(pair.current()))?);
        }
        Command::Reap { aor } => {
            let reaper = Reaper::new(Arc::clone(&manager), config.reaper)?;
            let outcome = reaper.reap(&aor, None).await?;
            info!("Reaped {} in {} attempt(s)", aor, outcome.attempts);
            println!(
                "{}: {} binding(s), {} subscription(s)",
                aor, outcome.bindings, outcome.subscriptions
            );
        }
        Command::Deregister { aor, binding_id } => {
            deregister(&manager, &aor, &binding_id, config.reaper.max_attempts).await?;
            println!("{}: removed binding {}", aor, binding_id);
        }
        Command::Watch => {
            let reaper = Reaper::new(Arc::clone(&manager), config.reaper)?;
            let pops = LinesStream::new(BufReader::new(tokio::io::stdin()).lines())
                .map_while(|line| line.ok())
                .filter_map(|line| parse_pop(&line));
            reaper.run(pops).await?;
        }
    }

    Ok(())
}

/// Remove one binding, re-fetching on lost races
async fn deregister(
    manager: &RegistrationManager,
    aor: &str,
    binding_id: &str,
    max_attempts: usize,
) -> Result<()> {
    for attempt in 1..=max_attempts {
        let mut pair = manager.get_aor_data(aor).await?;
        if pair.current().binding(binding_id).is_none() {
            anyhow::bail!("{} has no binding {}", aor, binding_id);
        }

        pair.current_mut().remove_binding(binding_id);
        if manager.set_aor_data(aor, &[], &mut pair).await {
            return Ok(());
        }
        warn!("Deregister attempt {} for {} lost its write", attempt, aor);
    }

    anyhow::bail!("gave up deregistering {} after {} attempts", aor, max_attempts)
}

/// Parse one timer pop line; blank and malformed lines are skipped
fn parse_pop(line: &str) -> Option<TimerPop> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str(line) {
        Ok(pop) => Some(pop),
        Err(e) => {
            warn!("Ignoring malformed timer pop {:?}: {}", line, e);
            None
        }
    }
}

/// Render an AoR for display
fn describe(aor: &Aor) -> serde_json::Value {
    serde_json::json!({
        "uri": aor.uri(),
        "version": aor.version_token(),
        "timer_id": aor.timer_id(),
        "notify_cseq": aor.notify_cseq(),
        "bindings": aor.bindings(),
        "subscriptions": aor.subscriptions(),
    })
}

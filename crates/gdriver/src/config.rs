//! Driver configuration
//!
//! Compile-time defaults, overridden by environment variables, overridden
//! by `--key=value` entries in the argument vector passed to `init`.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Argument vector (`--workers=8`)
//! 2. Environment variables (`GDRIVER_WORKERS=8`)
//! 3. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use gdriver::DriverConfig;
//!
//! let config = DriverConfig::from_env()
//!     .workers(8)
//!     .items(10_000);
//! ```

use std::path::PathBuf;
use std::str::FromStr;

use gdriver_core::constants::{MAX_ITEM_SIZE, MAX_STATE_SIZE};
use gdriver_core::error::{DriverError, DriverResult};
use gdriver_core::source::WorkSource;
use gdriver_executor::DispatcherConfig;
use gdriver_module::{FixedPool, SyntheticSource, TraceSource};

/// Library defaults.
pub mod defaults {
    use gdriver_core::constants::DEFAULT_STATE_SIZE;

    /// 0 = size the pool from the CPU count.
    pub const WORKERS: usize = 0;
    pub const ITEMS: u64 = 1024;
    pub const ITEM_SIZE: usize = 512;
    pub const STATE_SIZE: usize = DEFAULT_STATE_SIZE;
    pub const PROGRESS_INTERVAL: u64 = 100_000;
}

/// Get environment variable parsed as `T`, or `default` if unset or invalid.
fn env_get<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_get_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Worker threads. 0 = auto.
    pub workers: usize,
    /// Items produced by the synthetic source.
    pub items: u64,
    /// Synthetic item size, and chunk size when replaying a trace.
    pub item_size: usize,
    /// Module state size when the module does not export one.
    pub state_size: usize,
    /// Replay this file instead of generating items.
    pub trace: Option<PathBuf>,
    /// Log dispatch progress every N items. 0 = off.
    pub progress_interval: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl DriverConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `GDRIVER_WORKERS` - Worker threads (0 = auto)
    /// - `GDRIVER_ITEMS` - Synthetic item count
    /// - `GDRIVER_ITEM_SIZE` - Item / trace chunk size in bytes
    /// - `GDRIVER_STATE_SIZE` - Default module state size in bytes
    /// - `GDRIVER_TRACE` - Trace file to replay
    /// - `GDRIVER_PROGRESS_INTERVAL` - Progress log interval in items
    pub fn from_env() -> Self {
        Self {
            workers: env_get("GDRIVER_WORKERS", defaults::WORKERS),
            items: env_get("GDRIVER_ITEMS", defaults::ITEMS),
            item_size: env_get("GDRIVER_ITEM_SIZE", defaults::ITEM_SIZE),
            state_size: env_get("GDRIVER_STATE_SIZE", defaults::STATE_SIZE),
            trace: env_get_opt("GDRIVER_TRACE"),
            progress_interval: env_get("GDRIVER_PROGRESS_INTERVAL", defaults::PROGRESS_INTERVAL),
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            workers: defaults::WORKERS,
            items: defaults::ITEMS,
            item_size: defaults::ITEM_SIZE,
            state_size: defaults::STATE_SIZE,
            trace: None,
            progress_interval: defaults::PROGRESS_INTERVAL,
        }
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n;
        self
    }

    pub fn items(mut self, n: u64) -> Self {
        self.items = n;
        self
    }

    pub fn item_size(mut self, n: usize) -> Self {
        self.item_size = n;
        self
    }

    pub fn state_size(mut self, n: usize) -> Self {
        self.state_size = n;
        self
    }

    pub fn trace(mut self, path: impl Into<PathBuf>) -> Self {
        self.trace = Some(path.into());
        self
    }

    pub fn progress_interval(mut self, n: u64) -> Self {
        self.progress_interval = n;
        self
    }

    /// Apply `--key=value` overrides from an argument vector.
    ///
    /// `argv[0]` and anything not starting with `--` are ignored.
    pub fn apply_args<A: AsRef<str>>(&mut self, args: &[A]) -> DriverResult<()> {
        for arg in args.iter().skip(1).map(AsRef::as_ref) {
            let Some(flag) = arg.strip_prefix("--") else {
                continue;
            };
            let (key, value) = flag
                .split_once('=')
                .ok_or_else(|| DriverError::Config(format!("expected --key=value, got `{}`", arg)))?;
            match key {
                "workers" => self.workers = parse(key, value)?,
                "items" => self.items = parse(key, value)?,
                "item-size" => self.item_size = parse(key, value)?,
                "state-size" => self.state_size = parse(key, value)?,
                "trace" => self.trace = Some(PathBuf::from(value)),
                "progress-interval" => self.progress_interval = parse(key, value)?,
                _ => return Err(DriverError::Config(format!("unknown option `--{}`", key))),
            }
        }
        Ok(())
    }

    /// Reject sizes the driver will not allocate.
    pub fn validate(&self) -> DriverResult<()> {
        if self.state_size > MAX_STATE_SIZE {
            return Err(DriverError::Config(format!(
                "state size {} exceeds limit of {} bytes",
                self.state_size, MAX_STATE_SIZE
            )));
        }
        if self.item_size > MAX_ITEM_SIZE {
            return Err(DriverError::Config(format!(
                "item size {} exceeds limit of {} bytes",
                self.item_size, MAX_ITEM_SIZE
            )));
        }
        Ok(())
    }

    /// Pool size actually used.
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            FixedPool::auto_size()
        } else {
            self.workers
        }
    }

    /// Work source described by this config.
    pub fn build_source(&self) -> DriverResult<Box<dyn WorkSource>> {
        match &self.trace {
            Some(path) => {
                let source = TraceSource::open(path, self.item_size).map_err(|e| {
                    DriverError::Config(format!("trace {}: {}", path.display(), e))
                })?;
                Ok(Box::new(source))
            }
            None => Ok(Box::new(SyntheticSource::new(self.items, self.item_size))),
        }
    }

    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            progress_interval: self.progress_interval,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> DriverResult<T> {
    value
        .parse()
        .map_err(|_| DriverError::Config(format!("invalid value `{}` for --{}", value, key)))
}

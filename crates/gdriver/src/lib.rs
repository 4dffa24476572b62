//! # gdriver - Generic Handler Driver
//!
//! Loads a handler module, binds its host / process / thread callbacks by
//! name, and drives a stream of work items through them on a fixed pool
//! of worker threads.
//!
//! ## Quick Start
//!
//! ```ignore
//! fn main() -> gdriver::DriverResult<()> {
//!     gdriver::logging::init();
//!
//!     let args: Vec<String> = std::env::args().collect();
//!     gdriver::init(&args, "libreduce_l1.so", None, "reduce_l1_ph", "reduce_l1_th")?;
//!     let report = gdriver::run()?;
//!     println!("{}", report);
//!     gdriver::fini();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Driver (this crate)                      │
//! │          init / run / fini, config, logging, report         │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌─────────────┐     ┌─────────────┐
//!    │ Handler   │      │ Dispatcher  │     │ Work Source │
//!    │ Registry  │      │ (run thread)│◀────│ synthetic / │
//!    │ dlopen+sym│      │ host, proc  │     │ trace / vec │
//!    └───────────┘      └─────────────┘     └─────────────┘
//!                              │ rendezvous hand-off
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Worker   │      │  Worker   │      │  Worker   │
//!    │ thread cb │      │ thread cb │      │ thread cb │
//!    └───────────┘      └───────────┘      └───────────┘
//! ```
//!
//! ## Handler ABI
//!
//! ```text
//! int host   (void *state, size_t len);                    // optional, once
//! int process(gdriver_item *item, void *state, size_t len); // 0 forward, 1 drop
//! int thread (const gdriver_item *item, void *state, size_t len); // 0 ok
//! ```

pub mod config;
pub mod driver;
pub mod logging;

// Re-export core types
pub use gdriver_core::{
    DriverError,
    DriverResult,
    DriverState,
    ItemError,
    ItemId,
    ResolutionError,
    ResourceError,
    RunReport,
    WorkItem,
    WorkSource,
};
pub use gdriver_core::abi;

// Re-export default implementations
pub use gdriver_module::{
    DylibLoader,
    FeedSource,
    StaticLoader,
    SymbolTable,
    SyntheticSource,
    TraceSource,
    VecSource,
};

pub use config::DriverConfig;
pub use driver::Driver;

use std::path::Path;
use std::sync::OnceLock;

static GLOBAL: OnceLock<Driver> = OnceLock::new();

/// The process-wide driver behind [`init`], [`run`] and [`fini`].
pub fn global() -> &'static Driver {
    GLOBAL.get_or_init(Driver::new)
}

/// Initialize the process-wide driver.
///
/// Installs logging, applies `--key=value` overrides from `args`, loads
/// `handlers_file` and binds the named callbacks. `host` may be `None`.
pub fn init<A: AsRef<str>>(
    args: &[A],
    handlers_file: impl AsRef<Path>,
    host: Option<&str>,
    process: &str,
    thread: &str,
) -> DriverResult<()> {
    logging::init();
    global().init(args, handlers_file, host, process, thread)
}

/// Run the process-wide driver to completion.
pub fn run() -> DriverResult<RunReport> {
    global().run()
}

/// Tear down the process-wide driver. Idempotent.
pub fn fini() {
    global().fini()
}

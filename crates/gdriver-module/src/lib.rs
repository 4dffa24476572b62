//! # gdriver-module — Default implementations
//!
//! This crate provides the default implementation for every gdriver trait,
//! plus the handler registry that turns a loaded module into callable
//! bindings.
//!
//! ## Default stack
//!
//! | Trait           | Default Impl     | Alternatives                         |
//! |-----------------|------------------|--------------------------------------|
//! | ModuleLoader    | DylibLoader      | StaticLoader (in-process tables)     |
//! | WorkerPool      | FixedPool        | —                                    |
//! | ItemExecutor    | HandlerModule    | —                                    |
//! | WorkSource      | SyntheticSource  | VecSource, FeedSource, TraceSource   |

pub mod dylib_loader;
pub mod static_loader;
pub mod registry;
pub mod fixed_pool;
pub mod synthetic_source;
pub mod vec_source;
pub mod feed_source;
pub mod trace_source;

pub use dylib_loader::{DylibLoader, DylibModule};
pub use feed_source::FeedSource;
pub use fixed_pool::FixedPool;
pub use registry::{Binding, HandlerModule, HandlerRegistry, ProcessOutcome};
pub use static_loader::{StaticLoader, StaticModule, SymbolTable};
pub use synthetic_source::SyntheticSource;
pub use trace_source::TraceSource;
pub use vec_source::VecSource;

//! `StaticLoader` — in-process `ModuleLoader`.
//!
//! Handler modules are symbol tables registered under a path. Nothing is
//! opened from disk. Useful for handlers linked into the driver binary and
//! for exercising the driver without building a shared library.
//!
//! Every load and unload is counted per path so callers can check that a
//! module was loaded once and released once.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use gdriver_core::abi::{
    AbiVersionFn, HostFn, ProcessFn, StateSizeFn, Symbol, SymbolKind, ThreadFn, ABI_VERSION_SYMBOL,
    STATE_SIZE_SYMBOL,
};
use gdriver_core::error::{ResolutionError, ResourceError};
use gdriver_core::loader::{LoadedModule, ModuleLoader};
use parking_lot::Mutex;

/// Symbols exported by one static module.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: HashMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(mut self, name: &str, f: HostFn) -> Self {
        self.symbols.insert(name.to_string(), Symbol::Host(f));
        self
    }

    pub fn process(mut self, name: &str, f: ProcessFn) -> Self {
        self.symbols.insert(name.to_string(), Symbol::Process(f));
        self
    }

    pub fn thread(mut self, name: &str, f: ThreadFn) -> Self {
        self.symbols.insert(name.to_string(), Symbol::Thread(f));
        self
    }

    pub fn abi_version(mut self, f: AbiVersionFn) -> Self {
        self.symbols.insert(ABI_VERSION_SYMBOL.to_string(), Symbol::AbiVersion(f));
        self
    }

    pub fn state_size(mut self, f: StateSizeFn) -> Self {
        self.symbols.insert(STATE_SIZE_SYMBOL.to_string(), Symbol::StateSize(f));
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[derive(Debug)]
struct Entry {
    table: SymbolTable,
    loads: AtomicUsize,
    unloads: AtomicUsize,
}

/// Registry of in-process handler modules, keyed by path.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct StaticLoader {
    modules: Arc<Mutex<HashMap<PathBuf, Arc<Entry>>>>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `table` under `path`, replacing any previous table.
    pub fn register(&self, path: impl Into<PathBuf>, table: SymbolTable) {
        let entry = Arc::new(Entry {
            table,
            loads: AtomicUsize::new(0),
            unloads: AtomicUsize::new(0),
        });
        self.modules.lock().insert(path.into(), entry);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_module(self, path: impl Into<PathBuf>, table: SymbolTable) -> Self {
        self.register(path, table);
        self
    }

    /// Times the module at `path` has been loaded.
    pub fn loads(&self, path: impl AsRef<Path>) -> usize {
        self.counter(path.as_ref(), |e| &e.loads)
    }

    /// Times the module at `path` has been unloaded.
    pub fn unloads(&self, path: impl AsRef<Path>) -> usize {
        self.counter(path.as_ref(), |e| &e.unloads)
    }

    fn counter(&self, path: &Path, pick: impl Fn(&Entry) -> &AtomicUsize) -> usize {
        self.modules
            .lock()
            .get(path)
            .map(|e| pick(e.as_ref()).load(Ordering::SeqCst))
            .unwrap_or(0)
    }
}

impl ModuleLoader for StaticLoader {
    type Module = StaticModule;

    fn load(&self, path: &Path) -> Result<StaticModule, ResolutionError> {
        let entry = self
            .modules
            .lock()
            .get(path)
            .cloned()
            .ok_or_else(|| ResolutionError::ModuleLoad {
                path: path.to_path_buf(),
                reason: "no static module registered under this path".into(),
            })?;
        entry.loads.fetch_add(1, Ordering::SeqCst);
        Ok(StaticModule {
            path: path.to_path_buf(),
            entry,
        })
    }
}

/// A loaded static module.
#[derive(Debug)]
pub struct StaticModule {
    path: PathBuf,
    entry: Arc<Entry>,
}

impl LoadedModule for StaticModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, name: &str, kind: SymbolKind) -> Option<Symbol> {
        self.entry
            .table
            .symbols
            .get(name)
            .copied()
            .filter(|sym| sym.kind() == kind)
    }

    fn unload(self) -> Result<(), ResourceError> {
        self.entry.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

//! Handler registry — resolves a handler module into typed callback bindings.
//!
//! ```text
//! resolve(path, host?, process, thread)
//!     │
//!     ├── loader.load(path)                     ModuleLoad on failure
//!     ├── gdriver_abi_version()  (optional)     AbiMismatch if != ABI_VERSION
//!     ├── host symbol            (if named)     MissingSymbol
//!     ├── process symbol                        MissingSymbol
//!     ├── thread symbol                         MissingSymbol
//!     ├── gdriver_state_size()   (optional)     else configured default
//!     └── state blob allocation                 StateAlloc above MAX_STATE_SIZE
//! ```
//!
//! On any failure after the load, the module is unloaded before the error
//! is returned. A registry loads at most one module in its lifetime.

use std::path::{Path, PathBuf};

use gdriver_core::abi::{
    HostFn, ItemDesc, ProcessFn, Symbol, SymbolKind, ThreadFn, ABI_VERSION, ABI_VERSION_SYMBOL,
    PROCESS_DROP, PROCESS_FORWARD, STATE_SIZE_SYMBOL,
};
use gdriver_core::constants::DEFAULT_STATE_SIZE;
use gdriver_core::error::{DriverError, DriverResult, ItemError, ResolutionError, ResourceError};
use gdriver_core::item::WorkItem;
use gdriver_core::loader::{LoadedModule, ModuleLoader};
use gdriver_core::module_state::ModuleState;
use gdriver_core::pool::ItemExecutor;

/// A named, resolved callback.
#[derive(Debug, Clone)]
pub struct Binding<F> {
    pub name: String,
    pub f: F,
}

/// Result of the process phase for one item.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Hand the (possibly rewritten) item to a worker.
    Forward(WorkItem),
    /// Discard the item.
    Drop,
}

pub struct HandlerRegistry<L: ModuleLoader> {
    loader: L,
    default_state_size: usize,
    loaded: Option<PathBuf>,
}

impl<L: ModuleLoader> HandlerRegistry<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            default_state_size: DEFAULT_STATE_SIZE,
            loaded: None,
        }
    }

    /// State size used when the module does not export `gdriver_state_size`.
    pub fn default_state_size(mut self, n: usize) -> Self {
        self.default_state_size = n;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Path of the module this registry loaded, if any.
    pub fn loaded(&self) -> Option<&Path> {
        self.loaded.as_deref()
    }

    pub fn resolve(
        &mut self,
        path: &Path,
        host: Option<&str>,
        process: &str,
        thread: &str,
    ) -> DriverResult<HandlerModule<L::Module>> {
        if let Some(loaded) = &self.loaded {
            return Err(ResolutionError::AlreadyLoaded {
                path: loaded.clone(),
            }
            .into());
        }

        let module = self.loader.load(path)?;
        self.loaded = Some(path.to_path_buf());

        let bound = bind(&module, host, process, thread, self.default_state_size)
            .map_err(DriverError::from)
            .and_then(|bound| {
                let state = ModuleState::try_zeroed(bound.state_size)?;
                Ok((bound, state))
            });

        match bound {
            Ok((bound, state)) => {
                tracing::info!(
                    module = %path.display(),
                    host = host.unwrap_or("-"),
                    process,
                    thread,
                    state_size = bound.state_size,
                    "handler module resolved"
                );
                Ok(HandlerModule {
                    module,
                    host: bound.host,
                    process: bound.process,
                    thread: bound.thread,
                    abi_version: bound.abi_version,
                    state,
                })
            }
            Err(e) => {
                if let Err(release) = module.unload() {
                    tracing::error!(module = %path.display(), error = %release, "unload after failed resolution");
                }
                Err(e)
            }
        }
    }
}

struct Bound {
    host: Option<Binding<HostFn>>,
    process: Binding<ProcessFn>,
    thread: Binding<ThreadFn>,
    abi_version: Option<u32>,
    state_size: usize,
}

fn missing<M: LoadedModule>(module: &M, symbol: &str) -> ResolutionError {
    ResolutionError::MissingSymbol {
        path: module.path().to_path_buf(),
        symbol: symbol.to_string(),
    }
}

fn bind<M: LoadedModule>(
    module: &M,
    host: Option<&str>,
    process: &str,
    thread: &str,
    default_state_size: usize,
) -> Result<Bound, ResolutionError> {
    let abi_version = match module.resolve(ABI_VERSION_SYMBOL, SymbolKind::AbiVersion) {
        // Safety: metadata symbols take no arguments and touch no state.
        Some(Symbol::AbiVersion(f)) => Some(unsafe { f() }),
        _ => None,
    };
    if let Some(found) = abi_version {
        if found != ABI_VERSION {
            return Err(ResolutionError::AbiMismatch {
                path: module.path().to_path_buf(),
                expected: ABI_VERSION,
                found,
            });
        }
    }

    let host = match host {
        Some(name) => match module.resolve(name, SymbolKind::Host) {
            Some(Symbol::Host(f)) => Some(Binding { name: name.to_string(), f }),
            _ => return Err(missing(module, name)),
        },
        None => None,
    };

    let process = match module.resolve(process, SymbolKind::Process) {
        Some(Symbol::Process(f)) => Binding { name: process.to_string(), f },
        _ => return Err(missing(module, process)),
    };

    let thread = match module.resolve(thread, SymbolKind::Thread) {
        Some(Symbol::Thread(f)) => Binding { name: thread.to_string(), f },
        _ => return Err(missing(module, thread)),
    };

    let state_size = match module.resolve(STATE_SIZE_SYMBOL, SymbolKind::StateSize) {
        Some(Symbol::StateSize(f)) => unsafe { f() },
        _ => default_state_size,
    };

    Ok(Bound {
        host,
        process,
        thread,
        abi_version,
        state_size,
    })
}

/// A resolved handler module: the loaded module, its bindings and its
/// state blob. Released with [`HandlerModule::release`].
pub struct HandlerModule<M: LoadedModule> {
    module: M,
    host: Option<Binding<HostFn>>,
    process: Binding<ProcessFn>,
    thread: Binding<ThreadFn>,
    abi_version: Option<u32>,
    state: ModuleState,
}

impl<M: LoadedModule> HandlerModule<M> {
    pub fn path(&self) -> &Path {
        self.module.path()
    }

    pub fn host_name(&self) -> Option<&str> {
        self.host.as_ref().map(|b| b.name.as_str())
    }

    pub fn process_name(&self) -> &str {
        &self.process.name
    }

    pub fn thread_name(&self) -> &str {
        &self.thread.name
    }

    pub fn abi_version(&self) -> Option<u32> {
        self.abi_version
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ModuleState {
        &mut self.state
    }

    /// Run the host callback, if one is bound. Returns whether it ran.
    ///
    /// Must complete before the first `process()` or `execute()`.
    pub fn run_host(&self) -> Result<bool, DriverError> {
        let Some(host) = &self.host else {
            return Ok(false);
        };
        // Safety: the blob is valid for `len` bytes and no other callback
        // runs during the host phase.
        let code = unsafe { (host.f)(self.state.as_ptr(), self.state.len()) };
        if code != 0 {
            return Err(DriverError::HostPhase {
                symbol: host.name.clone(),
                code,
            });
        }
        Ok(true)
    }

    /// Run the process callback on `item`. Dispatch thread only.
    pub fn process(&self, mut item: WorkItem) -> Result<ProcessOutcome, ItemError> {
        let id = item.id;
        let len_before = item.payload.len();
        let mut desc = ItemDesc::borrow_mut(&mut item);
        let data = desc.data;

        // Safety: `desc` points into `item.payload`, which is not touched
        // until the callback returns.
        let code = unsafe { (self.process.f)(&mut desc, self.state.as_ptr(), self.state.len()) };

        match code {
            PROCESS_DROP => Ok(ProcessOutcome::Drop),
            PROCESS_FORWARD => {
                let invalid = |reason: String| ItemError::InvalidTransform { item: id, reason };
                if desc.id != id.as_u64() {
                    return Err(invalid(format!("id rewritten to {}", desc.id)));
                }
                if desc.data != data {
                    return Err(invalid("payload pointer moved".into()));
                }
                if desc.len > len_before {
                    return Err(invalid(format!(
                        "payload grew from {} to {} bytes",
                        len_before, desc.len
                    )));
                }
                item.payload.truncate(desc.len);
                Ok(ProcessOutcome::Forward(item))
            }
            code => Err(ItemError::Process { item: id, code }),
        }
    }

    /// Unload the module. Consumes the handler so no binding outlives it.
    pub fn release(self) -> Result<(), ResourceError> {
        let HandlerModule { module, state, .. } = self;
        drop(state);
        let path = module.path().display().to_string();
        module.unload()?;
        tracing::debug!(module = %path, "handler module released");
        Ok(())
    }
}

impl<M: LoadedModule> ItemExecutor for HandlerModule<M> {
    fn execute(&self, item: &WorkItem) -> Result<(), ItemError> {
        let desc = ItemDesc {
            id: item.id.as_u64(),
            data: item.payload.as_ptr() as *mut u8,
            len: item.payload.len(),
            capacity: item.payload.len(),
        };
        // Safety: the thread callback receives a read-only view of an item
        // this worker owns exclusively.
        let code = unsafe { (self.thread.f)(&desc, self.state.as_ptr(), self.state.len()) };
        if code != 0 {
            return Err(ItemError::Execution { item: item.id, code });
        }
        Ok(())
    }
}

impl<M: LoadedModule> std::fmt::Debug for HandlerModule<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerModule")
            .field("path", &self.path())
            .field("host", &self.host_name())
            .field("process", &self.process.name)
            .field("thread", &self.thread.name)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_loader::{StaticLoader, SymbolTable};
    use gdriver_core::item::ItemId;
    use libc::{c_int, c_void};

    // State word 0: host invocations.
    unsafe extern "C" fn hh(state: *mut c_void, len: usize) -> c_int {
        assert!(len >= 8);
        *(state as *mut u64) += 1;
        0
    }

    unsafe extern "C" fn hh_fail(_state: *mut c_void, _len: usize) -> c_int {
        -3
    }

    // Odd ids are dropped, ids ending in 4 fail, the rest are halved.
    unsafe extern "C" fn ph(item: *mut ItemDesc, _s: *mut c_void, _l: usize) -> c_int {
        let item = &mut *item;
        if item.id % 2 == 1 {
            return PROCESS_DROP;
        }
        if item.id % 10 == 4 {
            return -7;
        }
        item.len /= 2;
        for i in 0..item.len {
            *item.data.add(i) = 0xAA;
        }
        PROCESS_FORWARD
    }

    unsafe extern "C" fn ph_grow(item: *mut ItemDesc, _s: *mut c_void, _l: usize) -> c_int {
        (*item).len += 1;
        PROCESS_FORWARD
    }

    // Fails on empty payloads.
    unsafe extern "C" fn th(item: *const ItemDesc, _s: *mut c_void, _l: usize) -> c_int {
        if (*item).len == 0 {
            1
        } else {
            0
        }
    }

    unsafe extern "C" fn abi_v1() -> u32 {
        1
    }

    unsafe extern "C" fn abi_v9() -> u32 {
        9
    }

    unsafe extern "C" fn state_64() -> usize {
        64
    }

    unsafe extern "C" fn state_huge() -> usize {
        usize::MAX
    }

    fn table() -> SymbolTable {
        SymbolTable::new()
            .host("reduce_l1_hh", hh)
            .process("reduce_l1_ph", ph)
            .thread("reduce_l1_th", th)
    }

    fn resolve(
        loader: &StaticLoader,
        host: Option<&str>,
    ) -> DriverResult<HandlerModule<crate::static_loader::StaticModule>> {
        HandlerRegistry::new(loader.clone()).resolve(
            Path::new("reduce_l1"),
            host,
            "reduce_l1_ph",
            "reduce_l1_th",
        )
    }

    #[test]
    fn test_resolve_without_host() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let m = resolve(&loader, None).unwrap();
        assert_eq!(m.host_name(), None);
        assert_eq!(m.process_name(), "reduce_l1_ph");
        assert_eq!(m.thread_name(), "reduce_l1_th");
        assert_eq!(m.state().len(), DEFAULT_STATE_SIZE);
        assert!(!m.run_host().unwrap());
    }

    #[test]
    fn test_missing_thread_symbol_unloads() {
        let loader = StaticLoader::new()
            .with_module("reduce_l1", SymbolTable::new().process("reduce_l1_ph", ph));
        match resolve(&loader, None).unwrap_err() {
            DriverError::Resolution(err) => assert_eq!(
                err,
                ResolutionError::MissingSymbol {
                    path: PathBuf::from("reduce_l1"),
                    symbol: "reduce_l1_th".into(),
                }
            ),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(loader.loads("reduce_l1"), 1);
        assert_eq!(loader.unloads("reduce_l1"), 1);
    }

    #[test]
    fn test_missing_process_symbol() {
        let loader = StaticLoader::new()
            .with_module("reduce_l1", SymbolTable::new().thread("reduce_l1_th", th));
        let err = resolve(&loader, None).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Resolution(ResolutionError::MissingSymbol { ref symbol, .. }) if symbol == "reduce_l1_ph"
        ));
    }

    #[test]
    fn test_named_host_must_exist() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let err = resolve(&loader, Some("nope_hh")).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Resolution(ResolutionError::MissingSymbol { ref symbol, .. }) if symbol == "nope_hh"
        ));
    }

    #[test]
    fn test_abi_version_checked() {
        let loader = StaticLoader::new().with_module("reduce_l1", table().abi_version(abi_v9));
        let err = resolve(&loader, None).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Resolution(ResolutionError::AbiMismatch { expected: 1, found: 9, .. })
        ));

        let loader = StaticLoader::new().with_module("reduce_l1", table().abi_version(abi_v1));
        assert_eq!(resolve(&loader, None).unwrap().abi_version(), Some(1));
    }

    #[test]
    fn test_state_size_from_module() {
        let loader = StaticLoader::new().with_module("reduce_l1", table().state_size(state_64));
        let m = resolve(&loader, None).unwrap();
        assert_eq!(m.state().len(), 64);
    }

    #[test]
    fn test_oversized_state_export_rejected() {
        let loader = StaticLoader::new().with_module("reduce_l1", table().state_size(state_huge));
        let err = resolve(&loader, None).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Resource(ResourceError::StateAlloc { bytes: usize::MAX, .. })
        ));
        assert_eq!(loader.loads("reduce_l1"), 1);
        assert_eq!(loader.unloads("reduce_l1"), 1);
    }

    #[test]
    fn test_oversized_default_state_rejected() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let err = HandlerRegistry::new(loader.clone())
            .default_state_size(usize::MAX)
            .resolve(Path::new("reduce_l1"), None, "reduce_l1_ph", "reduce_l1_th")
            .unwrap_err();
        assert!(matches!(err, DriverError::Resource(ResourceError::StateAlloc { .. })));
        assert_eq!(loader.unloads("reduce_l1"), 1);
    }

    #[test]
    fn test_registry_loads_once() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let mut reg = HandlerRegistry::new(loader);
        let _m = reg
            .resolve(Path::new("reduce_l1"), None, "reduce_l1_ph", "reduce_l1_th")
            .unwrap();
        assert_eq!(reg.loaded(), Some(Path::new("reduce_l1")));
        let err = reg
            .resolve(Path::new("reduce_l1"), None, "reduce_l1_ph", "reduce_l1_th")
            .unwrap_err();
        assert!(matches!(err, DriverError::Resolution(ResolutionError::AlreadyLoaded { .. })));
        assert_eq!(reg.loader().loads("reduce_l1"), 1);
    }

    #[test]
    fn test_host_runs_against_state() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let mut m = resolve(&loader, Some("reduce_l1_hh")).unwrap();
        assert!(m.run_host().unwrap());
        assert_eq!(m.state_mut().word(0), Some(1));
    }

    #[test]
    fn test_host_failure() {
        let loader = StaticLoader::new()
            .with_module("reduce_l1", table().host("reduce_l1_hh", hh_fail));
        let m = resolve(&loader, Some("reduce_l1_hh")).unwrap();
        match m.run_host().unwrap_err() {
            DriverError::HostPhase { symbol, code } => {
                assert_eq!(symbol, "reduce_l1_hh");
                assert_eq!(code, -3);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_process_outcomes() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let m = resolve(&loader, None).unwrap();

        assert_eq!(m.process(WorkItem::new(1, vec![1; 8])).unwrap(), ProcessOutcome::Drop);

        assert_eq!(
            m.process(WorkItem::new(4, vec![1; 8])).unwrap_err(),
            ItemError::Process { item: ItemId(4), code: -7 }
        );

        match m.process(WorkItem::new(2, vec![1; 8])).unwrap() {
            ProcessOutcome::Forward(item) => {
                assert_eq!(item.id, ItemId(2));
                assert_eq!(item.payload, vec![0xAA; 4]);
            }
            ProcessOutcome::Drop => panic!("item 2 should be forwarded"),
        }
    }

    #[test]
    fn test_process_growth_rejected() {
        let loader = StaticLoader::new()
            .with_module("reduce_l1", table().process("reduce_l1_ph", ph_grow));
        let m = resolve(&loader, None).unwrap();
        let err = m.process(WorkItem::new(6, vec![0; 3])).unwrap_err();
        assert!(matches!(err, ItemError::InvalidTransform { item: ItemId(6), .. }));
    }

    #[test]
    fn test_execute() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let m = resolve(&loader, None).unwrap();
        assert!(m.execute(&WorkItem::new(0, vec![1])).is_ok());
        assert_eq!(
            m.execute(&WorkItem::empty(5)).unwrap_err(),
            ItemError::Execution { item: ItemId(5), code: 1 }
        );
    }

    #[test]
    fn test_release_unloads_once() {
        let loader = StaticLoader::new().with_module("reduce_l1", table());
        let m = resolve(&loader, None).unwrap();
        m.release().unwrap();
        assert_eq!(loader.unloads("reduce_l1"), 1);
    }
}

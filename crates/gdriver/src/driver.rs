//! Lifecycle controller.
//!
//! A [`Driver`] runs exactly one `init → run → fini` sequence:
//!
//! ```text
//! init   parse overrides, build source, resolve module, spawn idle workers
//! run    host phase, dispatch loop, drain, report
//! fini   stop + wait if running, drain, release module (idempotent)
//! ```
//!
//! The stop signal is shared with the source at `init`, so a source that
//! blocks waiting for items (`FeedSource`) wakes up when `fini` or
//! `request_stop` is called.
//!
//! The session (module, pool, source, counters) lives behind a mutex. `run`
//! takes it out for the duration of the dispatch loop so that `state()` and
//! `fini()` stay callable from other threads while a run is in progress.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Condvar, Mutex};

use gdriver_core::error::{DriverError, DriverResult, ResourceError};
use gdriver_core::loader::{LoadedModule, ModuleLoader};
use gdriver_core::pool::WorkerPool;
use gdriver_core::report::{RunCounters, RunReport};
use gdriver_core::source::WorkSource;
use gdriver_core::state::DriverState;
use gdriver_executor::{dispatcher_loop, run_host_phase, DispatchSummary, DispatcherConfig};
use gdriver_module::{DylibLoader, FixedPool, HandlerModule, HandlerRegistry};

use crate::config::DriverConfig;

/// Everything acquired by a successful `init`.
struct Session<M: LoadedModule> {
    module: Arc<HandlerModule<M>>,
    pool: FixedPool,
    counters: Arc<RunCounters>,
    source: Box<dyn WorkSource>,
    dispatcher: DispatcherConfig,
}

struct Inner<M: LoadedModule> {
    state: DriverState,
    config: DriverConfig,
    session: Option<Session<M>>,
    /// Source installed before `init`.
    pending_source: Option<Box<dyn WorkSource>>,
    report: Option<RunReport>,
    teardown_error: Option<ResourceError>,
}

pub struct Driver<L: ModuleLoader = DylibLoader> {
    loader: L,
    inner: Mutex<Inner<L::Module>>,
    /// Signalled when a run leaves `Running`.
    run_finished: Condvar,
    stop: Arc<AtomicBool>,
}

impl Driver<DylibLoader> {
    /// Driver loading shared libraries, configured from the environment.
    pub fn new() -> Self {
        Self::with_loader(DylibLoader::new(), DriverConfig::from_env())
    }
}

impl Default for Driver<DylibLoader> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: ModuleLoader + Clone> Driver<L> {
    pub fn with_loader(loader: L, config: DriverConfig) -> Self {
        Self {
            loader,
            inner: Mutex::new(Inner {
                state: DriverState::Uninitialized,
                config,
                session: None,
                pending_source: None,
                report: None,
                teardown_error: None,
            }),
            run_finished: Condvar::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Resolve the handler module and start the worker pool.
    ///
    /// `args` is an argument vector whose `--key=value` entries override
    /// the configuration. On failure nothing stays acquired, the driver
    /// remains `Uninitialized` and a source installed with `set_source` is
    /// kept for the next attempt.
    pub fn init<A: AsRef<str>>(
        &self,
        args: &[A],
        module_path: impl AsRef<Path>,
        host: Option<&str>,
        process: &str,
        thread: &str,
    ) -> DriverResult<()> {
        let mut inner = self.inner.lock();
        if !inner.state.can_init() {
            return Err(DriverError::Lifecycle {
                op: "init",
                state: inner.state,
            });
        }

        let mut config = inner.config.clone();
        config.apply_args(args)?;
        config.validate()?;

        let installed = inner.pending_source.take();
        let from_caller = installed.is_some();
        let mut source = match installed {
            Some(source) => source,
            None => config.build_source()?,
        };

        let path = module_path.as_ref();
        let (module, pool, counters) = match self.acquire(&config, path, host, process, thread) {
            Ok(acquired) => acquired,
            Err(e) => {
                if from_caller {
                    inner.pending_source = Some(source);
                }
                return Err(e);
            }
        };
        source.attach_stop(Arc::clone(&self.stop));

        tracing::info!(
            module = %path.display(),
            workers = pool.size(),
            remaining = ?source.remaining(),
            "driver initialized"
        );

        inner.session = Some(Session {
            module,
            pool,
            counters,
            source,
            dispatcher: config.dispatcher(),
        });
        inner.config = config;
        inner.state = DriverState::Initialized;
        Ok(())
    }

    /// Resolve the module and spawn the pool. Releases the module if the
    /// pool cannot start.
    fn acquire(
        &self,
        config: &DriverConfig,
        path: &Path,
        host: Option<&str>,
        process: &str,
        thread: &str,
    ) -> DriverResult<(Arc<HandlerModule<L::Module>>, FixedPool, Arc<RunCounters>)> {
        let module = HandlerRegistry::new(self.loader.clone())
            .default_state_size(config.state_size)
            .resolve(path, host, process, thread)?;
        let module = Arc::new(module);

        let counters = Arc::new(RunCounters::new());
        match FixedPool::new(config.resolved_workers(), Arc::clone(&module), Arc::clone(&counters)) {
            Ok(pool) => Ok((module, pool, counters)),
            Err(e) => {
                // No worker holds the module any more.
                if let Err(release) = release_module(module) {
                    tracing::error!(error = %release, "release after failed pool start");
                }
                Err(e.into())
            }
        }
    }

    /// Run the host phase and dispatch every item, then drain the pool.
    ///
    /// Blocks until the source is exhausted (or `fini`/`request_stop` is
    /// called from another thread) and every in-flight item has completed.
    pub fn run(&self) -> DriverResult<RunReport> {
        let mut session = {
            let mut inner = self.inner.lock();
            let state = inner.state;
            let session = match inner.session.take() {
                Some(session) if state.can_run() => session,
                other => {
                    inner.session = other;
                    return Err(DriverError::Lifecycle { op: "run", state });
                }
            };
            inner.state = DriverState::Running;
            session
        };

        let started = Instant::now();
        let outcome = self.dispatch(&mut session);

        // ── Drain: no new dispatch, wait for in-flight items, join ──
        let drained = session.pool.drain();
        let report = session.counters.take_report(started.elapsed(), session.pool.size());

        {
            let mut inner = self.inner.lock();
            inner.session = Some(session);
            inner.report = Some(report.clone());
            inner.state = DriverState::Stopped;
            self.run_finished.notify_all();
        }

        let summary = outcome?;
        drained?;
        tracing::info!(
            pulled = summary.pulled,
            stopped_early = summary.stopped_early,
            throughput = report.throughput() as u64,
            "run complete: {}",
            report
        );
        Ok(report)
    }

    fn dispatch(&self, session: &mut Session<L::Module>) -> DriverResult<DispatchSummary> {
        run_host_phase(&*session.module)?;
        dispatcher_loop(
            &mut session.source,
            &*session.module,
            &session.pool,
            &session.counters,
            &session.dispatcher,
            &self.stop,
        )
    }

    /// Tear down. Safe to call in any state and any number of times.
    ///
    /// If a run is in progress on another thread, raises the stop signal
    /// and waits for it to drain. A run blocked on an idle source returns
    /// once the source notices the signal. Release failures are logged and kept in
    /// [`Driver::teardown_error`].
    pub fn fini(&self) {
        self.stop.store(true, Ordering::Release);

        let mut inner = self.inner.lock();
        if inner.state == DriverState::Running {
            tracing::info!("fini during run, waiting for drain");
            while inner.state == DriverState::Running {
                self.run_finished.wait(&mut inner);
            }
        }

        let previous = inner.state;
        inner.state = DriverState::Stopped;
        inner.pending_source = None;
        let Some(session) = inner.session.take() else {
            if previous != DriverState::Stopped {
                tracing::debug!(from = %previous, "fini with nothing acquired");
            }
            return;
        };

        let Session { module, mut pool, source, .. } = session;
        drop(source);

        let mut first_err = pool.drain().err();
        drop(pool);
        if let Err(e) = release_module(module) {
            first_err.get_or_insert(e);
        }

        match first_err {
            Some(e) => {
                tracing::error!(error = %e, "driver teardown");
                inner.teardown_error = Some(e);
            }
            None => tracing::info!(from = %previous, "driver finalized"),
        }
    }

    /// Stop pulling new items. The current run drains and returns normally.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Replace the configured work source. Only before `run`.
    pub fn set_source<S: WorkSource + 'static>(&self, source: S) -> DriverResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            DriverState::Uninitialized => {
                inner.pending_source = Some(Box::new(source));
                Ok(())
            }
            DriverState::Initialized => {
                if let Some(session) = inner.session.as_mut() {
                    let mut source: Box<dyn WorkSource> = Box::new(source);
                    source.attach_stop(Arc::clone(&self.stop));
                    session.source = source;
                }
                Ok(())
            }
            state => Err(DriverError::Lifecycle { op: "set source", state }),
        }
    }

    pub fn state(&self) -> DriverState {
        self.inner.lock().state
    }

    /// Report of the last run, once it has finished.
    pub fn report(&self) -> Option<RunReport> {
        self.inner.lock().report.clone()
    }

    /// Worker threads currently alive. 0 before `init` and after drain.
    ///
    /// While a run is in progress the pool is owned by the running thread,
    /// so this reports 0 then as well.
    pub fn worker_count(&self) -> usize {
        self.inner
            .lock()
            .session
            .as_ref()
            .map_or(0, |s| s.pool.live_workers())
    }

    /// Configuration in effect (argument overrides applied after `init`).
    pub fn config(&self) -> DriverConfig {
        self.inner.lock().config.clone()
    }

    /// First failure seen while tearing down, if any.
    pub fn teardown_error(&self) -> Option<ResourceError> {
        self.inner.lock().teardown_error.clone()
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: ModuleLoader> Drop for Driver<L> {
    fn drop(&mut self) {
        // Mirror of `fini` without the wait: `&mut self` means no run is active.
        let inner = self.inner.get_mut();
        inner.state = DriverState::Stopped;
        if let Some(Session { module, mut pool, .. }) = inner.session.take() {
            if let Err(e) = pool.drain() {
                tracing::error!(error = %e, "worker pool drain on drop");
            }
            drop(pool);
            if let Err(e) = release_module(module) {
                tracing::error!(error = %e, "module release on drop");
            }
        }
    }
}

/// Unload a module once every worker has let go of it.
fn release_module<M: LoadedModule>(module: Arc<HandlerModule<M>>) -> Result<(), ResourceError> {
    match Arc::try_unwrap(module) {
        Ok(module) => module.release(),
        Err(module) => Err(ResourceError::ModuleInUse {
            path: module.path().to_path_buf(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gdriver_core::abi::{ItemDesc, PROCESS_DROP, PROCESS_FORWARD};
    use gdriver_core::error::ResolutionError;
    use gdriver_core::item::WorkItem;
    use gdriver_module::{FeedSource, StaticLoader, SymbolTable, VecSource};
    use libc::{c_int, c_void};
    use std::io::Write;
    use std::sync::atomic::AtomicU64;
    use std::thread;
    use std::time::Duration;

    // State words: 0 = host calls, 1 = thread calls, 2 = sum of ids (reduce).

    unsafe fn word<'a>(state: *mut c_void, idx: usize) -> &'a AtomicU64 {
        &*(state as *const AtomicU64).add(idx)
    }

    unsafe extern "C" fn reduce_l1_hh(state: *mut c_void, _len: usize) -> c_int {
        word(state, 0).fetch_add(1, Ordering::SeqCst);
        0
    }

    unsafe extern "C" fn reduce_l1_ph(_item: *mut ItemDesc, _s: *mut c_void, _l: usize) -> c_int {
        PROCESS_FORWARD
    }

    unsafe extern "C" fn drop_odd_ph(item: *mut ItemDesc, _s: *mut c_void, _l: usize) -> c_int {
        if (*item).id % 2 == 1 {
            PROCESS_DROP
        } else {
            PROCESS_FORWARD
        }
    }

    unsafe extern "C" fn reduce_l1_th(item: *const ItemDesc, state: *mut c_void, _l: usize) -> c_int {
        word(state, 1).fetch_add(1, Ordering::SeqCst);
        word(state, 2).fetch_add((*item).id, Ordering::SeqCst);
        0
    }

    // Fails unless the host phase completed exactly once before it.
    unsafe extern "C" fn after_host_th(_item: *const ItemDesc, state: *mut c_void, _l: usize) -> c_int {
        if word(state, 0).load(Ordering::SeqCst) == 1 {
            0
        } else {
            7
        }
    }

    unsafe extern "C" fn slow_th(_item: *const ItemDesc, state: *mut c_void, _l: usize) -> c_int {
        word(state, 1).fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(2));
        0
    }

    unsafe extern "C" fn state_huge() -> usize {
        usize::MAX
    }

    fn table() -> SymbolTable {
        SymbolTable::new()
            .host("reduce_l1_hh", reduce_l1_hh)
            .process("reduce_l1_ph", reduce_l1_ph)
            .thread("reduce_l1_th", reduce_l1_th)
    }

    fn driver(table: SymbolTable, config: DriverConfig) -> Driver<StaticLoader> {
        let loader = StaticLoader::new().with_module("libreduce_l1.so", table);
        Driver::with_loader(loader, config)
    }

    fn init(d: &Driver<StaticLoader>, host: Option<&str>) -> DriverResult<()> {
        d.init(&["reduce_l1"], "libreduce_l1.so", host, "reduce_l1_ph", "reduce_l1_th")
    }

    #[test]
    fn test_reduce_l1_full_sequence() {
        let d = driver(table(), DriverConfig::new().workers(4).items(10).item_size(32));
        assert_eq!(d.state(), DriverState::Uninitialized);
        assert_eq!(d.worker_count(), 0);

        init(&d, None).unwrap();
        assert_eq!(d.state(), DriverState::Initialized);

        let report = d.run().unwrap();
        assert_eq!(d.state(), DriverState::Stopped);
        assert_eq!(report.received, 10);
        assert_eq!(report.processed, 10);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(report.workers, 4);
        assert_eq!(d.report(), Some(report));
        assert_eq!(d.worker_count(), 0);

        d.fini();
        assert_eq!(d.state(), DriverState::Stopped);
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);
        assert!(d.teardown_error().is_none());
    }

    #[test]
    fn test_args_override_config() {
        let d = driver(table(), DriverConfig::new().workers(4).items(10));
        d.init(
            &["driver", "--workers=2", "--items=25"],
            "libreduce_l1.so",
            None,
            "reduce_l1_ph",
            "reduce_l1_th",
        )
        .unwrap();
        assert_eq!(d.config().workers, 2);
        let report = d.run().unwrap();
        assert_eq!(report.received, 25);
        assert_eq!(report.workers, 2);
        d.fini();
    }

    #[test]
    fn test_bad_args_leave_uninitialized() {
        let d = driver(table(), DriverConfig::new());
        let err = d
            .init(&["driver", "--workers=lots"], "libreduce_l1.so", None, "reduce_l1_ph", "reduce_l1_th")
            .unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
        assert_eq!(d.state(), DriverState::Uninitialized);
        assert_eq!(d.loader().loads("libreduce_l1.so"), 0);
    }

    #[test]
    fn test_host_runs_once_before_threads() {
        let table = table().thread("reduce_l1_th", after_host_th);
        let d = driver(table, DriverConfig::new().workers(3).items(30));
        init(&d, Some("reduce_l1_hh")).unwrap();
        let report = d.run().unwrap();
        assert_eq!(report.processed, 30);
        assert_eq!(report.execution_failed, 0);
        d.fini();
    }

    #[test]
    fn test_missing_symbol_fails_init() {
        let table = SymbolTable::new()
            .process("reduce_l1_ph", reduce_l1_ph)
            .host("reduce_l1_hh", reduce_l1_hh);
        let d = driver(table, DriverConfig::new().workers(2));

        let err = init(&d, Some("reduce_l1_hh")).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Resolution(ResolutionError::MissingSymbol { ref symbol, .. }) if symbol == "reduce_l1_th"
        ));
        assert_eq!(d.state(), DriverState::Uninitialized);
        assert_eq!(d.worker_count(), 0);
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);

        // fini after a failed init is harmless.
        d.fini();
        assert_eq!(d.state(), DriverState::Stopped);
        assert!(d.teardown_error().is_none());
    }

    #[test]
    fn test_run_outside_initialized() {
        let d = driver(table(), DriverConfig::new().workers(2).items(3));
        let err = d.run().unwrap_err();
        assert!(matches!(
            err,
            DriverError::Lifecycle { op: "run", state: DriverState::Uninitialized }
        ));
        assert_eq!(d.state(), DriverState::Uninitialized);

        init(&d, None).unwrap();
        d.run().unwrap();
        let err = d.run().unwrap_err();
        assert!(matches!(err, DriverError::Lifecycle { state: DriverState::Stopped, .. }));
        assert_eq!(d.state(), DriverState::Stopped);
        d.fini();
    }

    #[test]
    fn test_init_twice_rejected() {
        let d = driver(table(), DriverConfig::new().workers(2));
        init(&d, None).unwrap();
        let err = init(&d, None).unwrap_err();
        assert!(matches!(err, DriverError::Lifecycle { op: "init", state: DriverState::Initialized }));
        assert_eq!(d.state(), DriverState::Initialized);
        assert_eq!(d.loader().loads("libreduce_l1.so"), 1);
        d.fini();
    }

    #[test]
    fn test_fini_is_idempotent() {
        let d = driver(table(), DriverConfig::new().workers(2).items(5));
        init(&d, None).unwrap();
        d.run().unwrap();
        d.fini();
        d.fini();
        d.fini();
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);
        drop(d);
    }

    #[test]
    fn test_fini_without_run_releases() {
        let d = driver(table(), DriverConfig::new().workers(3));
        init(&d, None).unwrap();
        assert_eq!(d.worker_count(), 3);
        d.fini();
        assert_eq!(d.state(), DriverState::Stopped);
        assert_eq!(d.worker_count(), 0);
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);
        assert!(d.report().is_none());
        assert!(matches!(d.run(), Err(DriverError::Lifecycle { .. })));
    }

    #[test]
    fn test_in_flight_bounded() {
        let table = table().thread("reduce_l1_th", slow_th);
        let d = driver(table, DriverConfig::new().workers(3).items(40));
        init(&d, None).unwrap();
        let report = d.run().unwrap();
        assert_eq!(report.processed, 40);
        assert!(report.peak_in_flight <= 3);
        assert!(report.peak_in_flight >= 1);
        d.fini();
    }

    #[test]
    fn test_set_source_and_drops() {
        let table = table().process("reduce_l1_ph", drop_odd_ph);
        let d = driver(table, DriverConfig::new().workers(2));
        let source: VecSource = (0..9u64).map(WorkItem::empty).collect();
        d.set_source(source).unwrap();
        init(&d, None).unwrap();

        let report = d.run().unwrap();
        assert_eq!(report.received, 9);
        assert_eq!(report.dropped, 4);
        assert_eq!(report.processed, 5);
        assert_eq!(report.accounted(), report.received);
        assert!(matches!(
            d.set_source(VecSource::default()),
            Err(DriverError::Lifecycle { .. })
        ));
        d.fini();
    }

    #[test]
    fn test_fini_during_run_stops_dispatch() {
        let table = table().thread("reduce_l1_th", slow_th);
        let d = Arc::new(driver(table, DriverConfig::new().workers(2).items(u64::MAX >> 1)));
        init(&d, None).unwrap();

        let runner = {
            let d = Arc::clone(&d);
            thread::spawn(move || d.run())
        };
        while d.state() != DriverState::Running {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));
        d.fini();

        assert_eq!(d.state(), DriverState::Stopped);
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);
        let report = runner.join().unwrap().unwrap();
        assert!(report.received > 0);
        assert!(report.received < u64::MAX >> 1);
        assert_eq!(report.accounted(), report.received);
    }

    #[test]
    fn test_installed_source_survives_failed_init() {
        let d = Driver::with_loader(StaticLoader::new(), DriverConfig::new().workers(2).items(50));
        let source: VecSource = (0..3u64).map(WorkItem::empty).collect();
        d.set_source(source).unwrap();

        let err = init(&d, None).unwrap_err();
        assert!(matches!(err, DriverError::Resolution(ResolutionError::ModuleLoad { .. })));
        assert_eq!(d.state(), DriverState::Uninitialized);

        d.loader().register("libreduce_l1.so", table());
        init(&d, None).unwrap();
        let report = d.run().unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.processed, 3);
        d.fini();
    }

    #[test]
    fn test_oversized_state_arg_rejected() {
        let d = driver(table(), DriverConfig::new().workers(2));
        let err = d
            .init(
                &["driver", "--state-size=18446744073709551615"],
                "libreduce_l1.so",
                None,
                "reduce_l1_ph",
                "reduce_l1_th",
            )
            .unwrap_err();
        assert!(matches!(err, DriverError::Config(_)));
        assert_eq!(d.state(), DriverState::Uninitialized);
        assert_eq!(d.loader().loads("libreduce_l1.so"), 0);
    }

    #[test]
    fn test_oversized_state_export_fails_init() {
        let d = driver(table().state_size(state_huge), DriverConfig::new().workers(2));
        let err = init(&d, None).unwrap_err();
        assert!(matches!(
            err,
            DriverError::Resource(ResourceError::StateAlloc { bytes: usize::MAX, .. })
        ));
        assert_eq!(d.state(), DriverState::Uninitialized);
        assert_eq!(d.worker_count(), 0);
        assert_eq!(d.loader().loads("libreduce_l1.so"), 1);
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);
    }

    #[test]
    fn test_trace_arg_replays_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[1u8; 10]).unwrap();
        file.flush().unwrap();

        let d = driver(table(), DriverConfig::new().workers(2).items(1000));
        let trace = format!("--trace={}", file.path().display());
        d.init(
            &["driver", trace.as_str(), "--item-size=4"],
            "libreduce_l1.so",
            None,
            "reduce_l1_ph",
            "reduce_l1_th",
        )
        .unwrap();
        assert_eq!(d.config().trace.as_deref(), Some(file.path()));

        // 10 bytes in 4 byte chunks: 4 + 4 + 2.
        let report = d.run().unwrap();
        assert_eq!(report.received, 3);
        assert_eq!(report.processed, 3);
        d.fini();
    }

    #[test]
    fn test_fini_wakes_idle_feed() {
        let d = Arc::new(driver(table(), DriverConfig::new().workers(2)));
        let (tx, feed) = FeedSource::unbounded();
        d.set_source(feed).unwrap();
        init(&d, None).unwrap();

        tx.send(WorkItem::empty(0)).unwrap();
        tx.send(WorkItem::empty(1)).unwrap();
        let runner = {
            let d = Arc::clone(&d);
            thread::spawn(move || d.run())
        };
        while d.state() != DriverState::Running {
            thread::yield_now();
        }
        thread::sleep(Duration::from_millis(20));

        // `tx` is still alive: only the stop signal can end the run.
        d.fini();
        assert_eq!(d.state(), DriverState::Stopped);
        assert_eq!(d.loader().unloads("libreduce_l1.so"), 1);

        let report = runner.join().unwrap().unwrap();
        assert_eq!(report.received, 2);
        assert_eq!(report.processed, 2);
        drop(tx);
    }
}

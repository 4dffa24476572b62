//! `DylibLoader` — default `ModuleLoader` implementation.
//!
//! Opens handler modules as shared libraries through libloading
//! (`dlopen` on Unix, `LoadLibrary` on Windows). A module path may be
//! given without the platform suffix, the way build scripts usually name
//! their outputs (`build/reduce_l1`). Candidates are tried in order:
//!
//! 1. the path verbatim
//! 2. the path with the platform suffix (`build/reduce_l1.so`)
//! 3. the path with prefix and suffix (`build/libreduce_l1.so`)

use std::env::consts::{DLL_EXTENSION, DLL_PREFIX};
use std::path::{Path, PathBuf};

use gdriver_core::abi::{AbiVersionFn, HostFn, ProcessFn, StateSizeFn, Symbol, SymbolKind, ThreadFn};
use gdriver_core::error::{ResolutionError, ResourceError};
use gdriver_core::loader::{LoadedModule, ModuleLoader};
use libloading::Library;

#[derive(Debug, Clone, Copy, Default)]
pub struct DylibLoader;

impl DylibLoader {
    pub fn new() -> Self {
        Self
    }

    /// File names tried for `path`, in order.
    pub fn candidates(path: &Path) -> Vec<PathBuf> {
        let mut out = vec![path.to_path_buf()];
        if path.extension().is_some() {
            return out;
        }
        out.push(path.with_extension(DLL_EXTENSION));
        if let Some(stem) = path.file_name().and_then(|n| n.to_str()) {
            if !DLL_PREFIX.is_empty() && !stem.starts_with(DLL_PREFIX) {
                out.push(path.with_file_name(format!("{}{}.{}", DLL_PREFIX, stem, DLL_EXTENSION)));
            }
        }
        out
    }
}

impl ModuleLoader for DylibLoader {
    type Module = DylibModule;

    fn load(&self, path: &Path) -> Result<DylibModule, ResolutionError> {
        let mut last_err = String::from("no candidate file names");
        for candidate in Self::candidates(path) {
            // Safety: loading a library runs its initializers. Handler
            // modules are trusted input supplied by the caller.
            match unsafe { Library::new(&candidate) } {
                Ok(library) => {
                    tracing::debug!(module = %path.display(), file = %candidate.display(), "handler module loaded");
                    return Ok(DylibModule {
                        path: path.to_path_buf(),
                        file: candidate,
                        library,
                    });
                }
                Err(e) => {
                    tracing::trace!(file = %candidate.display(), error = %e, "candidate rejected");
                    last_err = e.to_string();
                }
            }
        }
        Err(ResolutionError::ModuleLoad {
            path: path.to_path_buf(),
            reason: last_err,
        })
    }
}

/// A handler module backed by a shared library.
#[derive(Debug)]
pub struct DylibModule {
    path: PathBuf,
    file: PathBuf,
    library: Library,
}

impl DylibModule {
    /// File that was actually opened.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// # Safety
    /// `T` must match the real type of the exported symbol.
    unsafe fn get<T: Copy>(&self, name: &str) -> Option<T> {
        self.library.get::<T>(name.as_bytes()).ok().map(|sym| *sym)
    }
}

impl LoadedModule for DylibModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn resolve(&self, name: &str, kind: SymbolKind) -> Option<Symbol> {
        // Safety: the symbol type is fixed by `kind`; a module exporting a
        // symbol under that name with another type breaks the handler ABI.
        unsafe {
            match kind {
                SymbolKind::Host => self.get::<HostFn>(name).map(Symbol::Host),
                SymbolKind::Process => self.get::<ProcessFn>(name).map(Symbol::Process),
                SymbolKind::Thread => self.get::<ThreadFn>(name).map(Symbol::Thread),
                SymbolKind::AbiVersion => self.get::<AbiVersionFn>(name).map(Symbol::AbiVersion),
                SymbolKind::StateSize => self.get::<StateSizeFn>(name).map(Symbol::StateSize),
            }
        }
    }

    fn unload(self) -> Result<(), ResourceError> {
        let path = self.path;
        self.library.close().map_err(|e| ResourceError::ModuleRelease {
            path,
            reason: e.to_string(),
        })
    }
}

//! Handler module loading.
//!
//! A `ModuleLoader` turns a module path into a [`LoadedModule`]; the loaded
//! module hands out typed [`Symbol`]s by name and is released with an
//! explicit [`LoadedModule::unload`]. Nothing relies on `Drop` to unload.
//!
//! # Implementors (gdriver-module)
//!
//! - `DylibLoader` (default): `dlopen`/`LoadLibrary` through libloading.
//! - `StaticLoader`: symbol tables registered in-process. For handlers
//!   linked into the binary and for tests.

use std::path::Path;

use crate::abi::{Symbol, SymbolKind};
use crate::error::{ResolutionError, ResourceError};

pub trait ModuleLoader: Send + Sync {
    type Module: LoadedModule;

    /// Load the module at `path`.
    fn load(&self, path: &Path) -> Result<Self::Module, ResolutionError>;
}

/// A loaded handler module.
///
/// **Contract:**
/// - `resolve()` returns `None` both for a missing symbol and for a symbol
///   that exists but was registered with a different kind.
/// - Every pointer obtained through `resolve()` is dead after `unload()`.
pub trait LoadedModule: Send + Sync + Sized + 'static {
    /// Identity of the module.
    fn path(&self) -> &Path;

    /// Look up `name` as a symbol of the given kind.
    fn resolve(&self, name: &str, kind: SymbolKind) -> Option<Symbol>;

    /// Release the module.
    fn unload(self) -> Result<(), ResourceError>;
}

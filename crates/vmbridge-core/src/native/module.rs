//! The loaded VM module and its `{Unloaded, Loaded}` state machine.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use crate::error::{Error, Result};

use super::ffi::{
    CALL, CREATE_INSTANCE, DESTROY_INSTANCE, EntryPoints, LOAD_CONFIG, STATUS, symbol_name,
};
use super::shadow::ShadowCopy;

/// Resolves a module file into bound entry points.
///
/// `DylibLoader` is the production implementation; tests supply loaders that
/// hand out in-process functions.
pub trait ModuleLoader: Send + Sync {
    /// Open the module at `path` and bind all required entry points.
    fn load(&self, path: &Path) -> Result<LoadedModule>;
}

/// A module whose entry points are bound and callable.
pub struct LoadedModule {
    entry: EntryPoints,
    /// Keeps the code behind `entry` mapped. Dropping it unloads the module.
    _handle: Box<dyn Any + Send + Sync>,
}

impl LoadedModule {
    /// Pair bound entry points with the handle that keeps them valid.
    ///
    /// # Safety
    /// Every function pointer in `entry` must stay callable until `handle`
    /// is dropped, and must follow the signatures in [`super::ffi`].
    pub unsafe fn new(entry: EntryPoints, handle: impl Any + Send + Sync) -> Self {
        Self {
            entry,
            _handle: Box::new(handle),
        }
    }

    pub fn entry_points(&self) -> &EntryPoints {
        &self.entry
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

/// Library handle plus the shadow copy it was opened from.
struct DylibHandle {
    library: Option<Library>,
    shadow: Option<ShadowCopy>,
}

impl Drop for DylibHandle {
    fn drop(&mut self) {
        if let Some(library) = self.library.take() {
            if let Err(e) = library.close() {
                tracing::warn!("Failed to close module library: {}", e);
            }
        }
        // The copy can only be deleted once the library is closed.
        if let Some(shadow) = self.shadow.take() {
            shadow.release();
        }
    }
}

/// Loads VM modules from shared libraries via `libloading`.
#[derive(Debug, Clone)]
pub struct DylibLoader {
    symbol_prefix: String,
    shadow_dir: PathBuf,
}

impl DylibLoader {
    pub fn new(symbol_prefix: impl Into<String>, shadow_dir: impl Into<PathBuf>) -> Self {
        Self {
            symbol_prefix: symbol_prefix.into(),
            shadow_dir: shadow_dir.into(),
        }
    }

    pub fn symbol_prefix(&self) -> &str {
        &self.symbol_prefix
    }

    fn bind<T: Copy>(&self, library: &Library, path: &Path, name: &str) -> Result<T> {
        let symbol = symbol_name(&self.symbol_prefix, name);

        // Safety: the type is one of the fixed ABI signatures in `ffi`.
        let func = unsafe { library.get::<T>(symbol.as_bytes()) }.map_err(|e| {
            Error::MissingSymbol {
                path: path.to_path_buf(),
                symbol: symbol.clone(),
                message: e.to_string(),
            }
        })?;

        Ok(*func)
    }

    fn bind_all(&self, library: &Library, path: &Path) -> Result<EntryPoints> {
        Ok(EntryPoints {
            create_instance: self.bind(library, path, CREATE_INSTANCE)?,
            destroy_instance: self.bind(library, path, DESTROY_INSTANCE)?,
            load_config: self.bind(library, path, LOAD_CONFIG)?,
            call: self.bind(library, path, CALL)?,
            status: self.bind(library, path, STATUS)?,
        })
    }
}

impl ModuleLoader for DylibLoader {
    fn load(&self, path: &Path) -> Result<LoadedModule> {
        if !path.exists() {
            return Err(Error::Load {
                path: path.to_path_buf(),
                message: "file not found".to_string(),
            });
        }

        let shadow = ShadowCopy::prepare(path, &self.shadow_dir).map_err(|e| Error::Load {
            path: path.to_path_buf(),
            message: format!("failed to prepare module copy: {e}"),
        })?;

        // Safety: loading runs the library's initializers; the module is a
        // trusted artifact built by the rebuild pipeline or the operator.
        let library = match unsafe { Library::new(shadow.load_path()) } {
            Ok(library) => library,
            Err(e) => {
                shadow.release();
                return Err(Error::Load {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                });
            }
        };

        let entry = self.bind_all(&library, path);
        let handle = DylibHandle {
            library: Some(library),
            shadow: Some(shadow),
        };
        // On error `handle` is dropped here, closing the library again.
        let entry = entry?;

        // Safety: the pointers were resolved from the library owned by `handle`.
        Ok(unsafe { LoadedModule::new(entry, handle) })
    }
}

/// Load state of a [`NativeModule`].
#[derive(Debug, Default)]
pub enum ModuleState {
    #[default]
    Unloaded,
    Loaded(LoadedModule),
}

/// The single VM module slot.
///
/// Owned by the execution gate; nothing touches it outside a gated operation.
pub struct NativeModule {
    path: PathBuf,
    loader: Arc<dyn ModuleLoader>,
    state: ModuleState,
}

impl NativeModule {
    /// Create an unloaded module slot for `path`.
    pub fn new(path: impl Into<PathBuf>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self {
            path: path.into(),
            loader,
            state: ModuleState::Unloaded,
        }
    }

    /// Path of the module last requested.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a module is loaded.
    pub fn ready(&self) -> bool {
        matches!(self.state, ModuleState::Loaded(_))
    }

    pub fn state(&self) -> &ModuleState {
        &self.state
    }

    /// Entry points of the loaded module, if any.
    pub fn entry_points(&self) -> Option<&EntryPoints> {
        match &self.state {
            ModuleState::Loaded(loaded) => Some(loaded.entry_points()),
            ModuleState::Unloaded => None,
        }
    }

    /// Load the module at `path`, unloading any current module first.
    ///
    /// On failure the slot is left `Unloaded`.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.ready() {
            self.unload();
        }

        self.path = path.as_ref().to_path_buf();
        let loaded = self.loader.load(&self.path)?;
        self.state = ModuleState::Loaded(loaded);

        tracing::info!("Loaded VM module {}", self.path.display());
        Ok(())
    }

    /// Release the loaded module. No-op when nothing is loaded.
    pub fn unload(&mut self) {
        if let ModuleState::Loaded(loaded) = std::mem::take(&mut self.state) {
            drop(loaded);
            tracing::info!("Unloaded VM module {}", self.path.display());
        }
    }

    /// Swap in a freshly built module.
    ///
    /// Callers must hold the execution gate.
    pub fn reload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        tracing::info!("Reloading VM module from {}", path.as_ref().display());
        self.unload();
        self.load(path)
    }
}

impl fmt::Debug for NativeModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModule")
            .field("path", &self.path)
            .field("ready", &self.ready())
            .finish_non_exhaustive()
    }
}

impl Drop for NativeModule {
    fn drop(&mut self) {
        self.unload();
    }
}

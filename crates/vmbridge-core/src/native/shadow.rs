//! Shadow copies of the module file for hot reload.
//!
//! On Windows a loaded DLL cannot be overwritten, which would make the build
//! stage of a rebuild fail while the old module is still serving requests.
//! There the module is loaded from a UUID-named copy in a shadow directory
//! and the copy is deleted once the library has been released.
//!
//! On other platforms the original path is loaded directly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[cfg(windows)]
use uuid::Uuid;

/// The path a module was actually loaded from.
#[derive(Debug)]
pub struct ShadowCopy {
    load_path: PathBuf,
    /// Whether `load_path` is a copy we created and must delete.
    owned: bool,
}

impl ShadowCopy {
    /// Prepare `module_path` for loading.
    ///
    /// On Windows this copies the module into `shadow_dir`; elsewhere it
    /// returns the original path unchanged.
    pub fn prepare(module_path: &Path, shadow_dir: &Path) -> io::Result<Self> {
        #[cfg(windows)]
        {
            Self::create_uuid_copy(module_path, shadow_dir)
        }

        #[cfg(not(windows))]
        {
            let _ = shadow_dir;
            Ok(Self {
                load_path: module_path.to_path_buf(),
                owned: false,
            })
        }
    }

    #[cfg(windows)]
    fn create_uuid_copy(module_path: &Path, shadow_dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(shadow_dir)?;

        let stem = module_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("vm");
        let extension = module_path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("dll");
        let load_path = shadow_dir.join(format!("{}-{}.{}", stem, Uuid::new_v4(), extension));

        fs::copy(module_path, &load_path)?;
        tracing::debug!(
            "Created module copy: {} -> {}",
            module_path.display(),
            load_path.display()
        );

        Ok(Self {
            load_path,
            owned: true,
        })
    }

    /// Path to hand to the dynamic loader.
    pub fn load_path(&self) -> &Path {
        &self.load_path
    }

    /// Delete the copy, if one was made.
    ///
    /// Must only be called after the library loaded from it was dropped.
    pub fn release(self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.load_path) {
                tracing::warn!(
                    "Failed to remove module copy {}: {}",
                    self.load_path.display(),
                    e
                );
            }
        }
    }
}

/// Remove leftover module copies from a previous run.
///
/// Returns the number of files removed. Files that are still locked are
/// skipped.
pub fn cleanup_stale_copies(shadow_dir: &Path) -> io::Result<usize> {
    if !shadow_dir.exists() {
        return Ok(0);
    }

    let mut cleaned = 0;
    for entry in fs::read_dir(shadow_dir)? {
        let path = entry?.path();

        let extension = path.extension().and_then(|s| s.to_str()).unwrap_or("");
        if !matches!(extension, "dll" | "so" | "dylib") {
            continue;
        }

        if fs::remove_file(&path).is_ok() {
            tracing::debug!("Removed stale module copy: {}", path.display());
            cleaned += 1;
        }
    }

    if cleaned > 0 {
        tracing::info!("Cleaned up {} stale module copies", cleaned);
    }
    Ok(cleaned)
}

/// Default shadow directory, next to the module file.
pub fn default_shadow_dir(module_path: &Path) -> PathBuf {
    module_path
        .parent()
        .unwrap_or(Path::new("."))
        .join(".vmbridge-shadow")
}

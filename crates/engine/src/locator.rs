use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// Finds the dump engine executable without pinning a single install layout.
///
/// Locating is advisory: when nothing matches, the bare command name is
/// returned and any real failure surfaces when the subprocess is spawned.
#[derive(Debug, Clone)]
pub struct DumpEngineLocator {
    candidates: Vec<String>,
    fallback: String,
}

impl DumpEngineLocator {
    pub fn new(candidates: Vec<String>, fallback: impl Into<String>) -> Self {
        Self {
            candidates,
            fallback: fallback.into(),
        }
    }

    pub fn locate(&self) -> PathBuf {
        for candidate in &self.candidates {
            let path = Path::new(candidate);
            if is_executable(path) {
                debug!(candidate = %candidate, "dump engine candidate is executable");
                return path.to_path_buf();
            }
            match which::which(candidate) {
                Ok(resolved) => {
                    debug!(candidate = %candidate, resolved = %resolved.display(), "dump engine resolved through PATH");
                    return resolved;
                }
                Err(_) => debug!(candidate = %candidate, "dump engine candidate not usable"),
            }
        }

        warn!(
            fallback = %self.fallback,
            "no dump engine candidate matched, relying on the environment's command lookup"
        );
        PathBuf::from(&self.fallback)
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    std::fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

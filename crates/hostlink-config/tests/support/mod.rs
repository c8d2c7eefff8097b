//! Process-environment and temporary-file helpers for configuration tests.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use once_cell::sync::Lazy;
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// Serialises tests that read or mutate `HOSTLINK_*` variables and restores
/// every override on drop.
pub struct EnvLock {
    overrides: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvLock {
    pub fn acquire() -> Self {
        let guard = ENV_MUTEX.lock().unwrap_or_else(PoisonError::into_inner);
        Self {
            overrides: Vec::new(),
            _guard: guard,
        }
    }

    pub fn set_var(&mut self, key: &str, value: impl AsRef<OsStr>) {
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024; the mutex keeps
        // other loaders in this binary from observing it mid-change.
        unsafe { std::env::set_var(key, value) };
        self.overrides.push((key.to_owned(), previous));
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        while let Some((key, value)) = self.overrides.pop() {
            match value {
                Some(previous) => unsafe { std::env::set_var(&key, previous) },
                None => unsafe { std::env::remove_var(&key) },
            }
        }
    }
}

/// Writes `contents` to `name` inside `dir`.
pub fn write_config(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Err(error) = fs::write(&path, contents) {
        panic!("failed to write configuration: {error}");
    }
    path
}

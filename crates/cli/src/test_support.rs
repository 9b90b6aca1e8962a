use std::sync::{Mutex, OnceLock};

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Serializes tests that read or mutate the process environment.
pub(crate) fn with_locked_env<R>(run: impl FnOnce() -> R) -> R {
    let _guard = env_lock().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    run()
}

/// Set an environment variable in test contexts.
///
/// # Safety
/// `std::env::set_var` is unsafe on edition 2024. Call sites hold
/// `with_locked_env` so parallel tests never race on the environment.
pub(crate) fn set_env_var(key: &str, value: &str) {
    // SAFETY: callers hold the environment lock.
    unsafe {
        std::env::set_var(key, value);
    }
}

/// Remove an environment variable in test contexts.
///
/// # Safety
/// Same contract as [`set_env_var`].
pub(crate) fn remove_env_var(key: &str) {
    // SAFETY: callers hold the environment lock.
    unsafe {
        std::env::remove_var(key);
    }
}

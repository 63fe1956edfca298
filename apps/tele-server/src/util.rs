use std::path::PathBuf;

use once_cell::sync::{Lazy, OnceCell};
use std::sync::Mutex;

static STATE_DIR: Lazy<Mutex<OnceCell<PathBuf>>> = Lazy::new(|| Mutex::new(OnceCell::new()));

/// Root of the server's durable state (`TELE_STATE_DIR`, default
/// `./state`). Resolved once; later env changes do not move the state.
pub fn state_dir() -> PathBuf {
    let cell = STATE_DIR.lock().expect("state dir cache lock");
    if let Some(existing) = cell.get() {
        return existing.clone();
    }
    let resolved = std::env::var("TELE_STATE_DIR")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("state"));
    let _ = cell.set(resolved.clone());
    resolved
}

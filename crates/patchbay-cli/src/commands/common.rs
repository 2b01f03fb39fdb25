//! Helpers shared by commands.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Context;
use patchbay_config::{Config, default_config_path};

/// Loads `path`, or the default config file when no path is given.
///
/// An explicit path must exist; the default one may be missing.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => {
            let path = default_config_path();
            Config::load_or_default(&path)
                .with_context(|| format!("loading configuration from {}", path.display()))
        }
    }
}

/// Returns a flag cleared by Ctrl+C.
pub fn stop_on_ctrl_c() -> anyhow::Result<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        eprintln!("\nStopping...");
        r.store(false, Ordering::SeqCst);
    })?;
    Ok(running)
}

//! Storage path resolution for the webhook event store.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the storage directory.
pub const STORAGE_DIR_ENV: &str = "SINCH_MCP_STORAGE_DIR";

/// Returns the directory that holds the event store.
///
/// Uses `SINCH_MCP_STORAGE_DIR` when set, otherwise a platform data
/// directory:
/// - Linux: `~/.local/share/sinch-mcp`
/// - macOS: `~/Library/Application Support/sinch-mcp`
/// - Windows: `%LOCALAPPDATA%\sinch-mcp`
pub fn storage_dir() -> PathBuf {
    if let Ok(dir) = env::var(STORAGE_DIR_ENV) {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }

    if cfg!(target_os = "linux") {
        let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".local").join("share").join("sinch-mcp")
    } else if cfg!(target_os = "macos") {
        let home = env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("sinch-mcp")
    } else if cfg!(target_os = "windows") {
        let local_app_data = env::var("LOCALAPPDATA")
            .unwrap_or_else(|_| env::var("APPDATA").unwrap_or_else(|_| "C:\\tmp".to_string()));
        PathBuf::from(local_app_data).join("sinch-mcp")
    } else {
        PathBuf::from("/tmp").join("sinch-mcp")
    }
}

/// Path of this process's event store file.
///
/// The file name carries the process id: the store is owned exclusively by
/// one server process and deleted at its shutdown.
pub fn event_store_path() -> PathBuf {
    storage_dir().join(format!("webhooks-{}.db", std::process::id()))
}

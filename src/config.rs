use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::Error;

pub const KEY_DIR: &str = "dir";
pub const KEY_DBFILENAME: &str = "dbfilename";
pub const KEY_HOST: &str = "host";
pub const KEY_PORT: &str = "port";
pub const KEY_REPLICAOF: &str = "replicaof";

/// Cloneable handle to the process-wide option map. Seeded from the command
/// line before the listener starts, readable and writable at runtime through
/// `CONFIG GET`/`CONFIG SET`.
#[derive(Clone)]
pub struct Config {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl Config {
    pub fn new() -> Config {
        Config {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Seeds a new option. Re-adding an existing key is refused; startup
    /// code decides whether that is fatal.
    pub fn add(&self, key: &str, value: &str) -> Result<(), Error> {
        let mut options = self.lock();
        if options.contains_key(key) {
            return Err(format!("config key {:?} already exists", key).into());
        }
        options.insert(key.to_string(), value.to_string());
        Ok(())
    }

    /// Overwrites an option, inserting it if absent. This is the
    /// `CONFIG SET` path.
    pub fn set(&self, key: &str, value: &str) {
        self.lock().insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    /// True when both snapshot options are present, i.e. a database file
    /// location is fully configured.
    pub fn is_persistent(&self) -> bool {
        let options = self.lock();
        options.contains_key(KEY_DIR) && options.contains_key(KEY_DBFILENAME)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_refuses_duplicates() {
        let config = Config::new();

        config.add(KEY_PORT, "6379").unwrap();
        assert!(config.add(KEY_PORT, "6380").is_err());
        assert_eq!(config.get(KEY_PORT), Some("6379".to_string()));
    }

    #[test]
    fn set_overwrites() {
        let config = Config::new();

        config.add(KEY_DIR, "/tmp").unwrap();
        config.set(KEY_DIR, "/data");
        assert_eq!(config.get(KEY_DIR), Some("/data".to_string()));

        config.set("maxmemory", "0");
        assert_eq!(config.get("maxmemory"), Some("0".to_string()));
    }

    #[test]
    fn persistence_requires_both_options() {
        let config = Config::new();
        assert!(!config.is_persistent());

        config.add(KEY_DIR, "/tmp").unwrap();
        assert!(!config.is_persistent());

        config.add(KEY_DBFILENAME, "dump.rdb").unwrap();
        assert!(config.is_persistent());
    }
}

use std::{
    path::Path,
    sync::{Mutex, MutexGuard, OnceLock},
};

use tempfile::TempDir;

/// Serialises tests that touch process-wide state such as env vars.
pub fn test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// A SQLite database file inside a temporary directory. The directory is
/// removed when this value drops.
pub struct TempDatabase {
    dir: TempDir,
    url: String,
}

impl TempDatabase {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let url = sqlite_url(&dir.path().join("tracker.sqlite"));
        Ok(Self { dir, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

pub fn sqlite_url(path: &Path) -> String {
    format!("sqlite://{}?mode=rwc", path.to_string_lossy())
}

/// Sets env vars for the lifetime of the guard and restores the previous
/// values on drop.
pub struct TestEnvGuard {
    _lock: MutexGuard<'static, ()>,
    previous: Vec<(String, Option<String>)>,
}

impl TestEnvGuard {
    pub fn new(vars: &[(&str, &str)]) -> Self {
        let lock = test_lock().lock().unwrap_or_else(|err| err.into_inner());
        let previous = vars
            .iter()
            .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
            .collect();

        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            for (key, value) in vars {
                std::env::set_var(key, value);
            }
        }

        Self {
            _lock: lock,
            previous,
        }
    }
}

impl Drop for TestEnvGuard {
    fn drop(&mut self) {
        // SAFETY: tests using TestEnvGuard are serialized by test_lock.
        unsafe {
            for (key, value) in &self.previous {
                match value {
                    Some(value) => std::env::set_var(key, value),
                    None => std::env::remove_var(key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_database_url_points_inside_temp_dir() {
        let db = TempDatabase::new().unwrap();
        assert!(db.url().starts_with("sqlite://"));
        assert!(db.url().ends_with("tracker.sqlite?mode=rwc"));
        assert!(db.url().contains(&*db.dir().to_string_lossy()));
    }

    #[test]
    fn env_guard_restores_previous_values() {
        let key = "TEST_SUPPORT_GUARD_PROBE";
        {
            let _guard = TestEnvGuard::new(&[(key, "set")]);
            assert_eq!(std::env::var(key).as_deref(), Ok("set"));
        }
        assert!(std::env::var(key).is_err());
    }
}

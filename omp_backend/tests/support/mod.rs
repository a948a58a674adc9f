#![allow(dead_code)]

use std::collections::HashSet;
use std::io::Write;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use omp_rust::config::SITE_CONFIG_ENV;

static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Runs `f` with environment variables temporarily modified.
///
/// Variables are restored on unwind, and access to the process environment
/// is serialized across tests.
///
/// `changes` is a list of `(key, value)` pairs:
/// - `Some(v)` sets the variable to `v`
/// - `None` removes the variable
pub fn with_scoped_env<F, R>(changes: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let _guard = ScopedEnv::new(changes);
    f()
}

/// Runs `f` with `OMP_SITE_CONFIG` pointing at a temporary file holding
/// `content`.
pub fn with_site_config<F, R>(content: &str, f: F) -> R
where
    F: FnOnce() -> R,
{
    let file = site_config_file(content);
    let path = file.path().to_string_lossy().into_owned();
    with_scoped_env(&[(SITE_CONFIG_ENV, Some(path.as_str()))], f)
}

/// A temporary site configuration file, removed when dropped.
pub fn site_config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp site config");
    file.write_all(content.as_bytes())
        .expect("write temp site config");
    file
}

/// ISS element set as served by space-track.
pub const ISS_LINES: [&str; 2] = [
    "1 25544U 98067A   14206.52997318 -.00005757  00000-0 -91404-4 0  7690",
    "2 25544 051.6472 269.5323 0006361 286.1580 210.2768 15.50427728897273",
];

struct ScopedEnv {
    snapshot: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    fn new(changes: &[(&str, Option<&str>)]) -> Self {
        let keys: HashSet<&str> = changes.iter().map(|(k, _)| *k).collect();
        let snapshot = keys
            .into_iter()
            .map(|k| (k.to_string(), std::env::var(k).ok()))
            .collect::<Vec<_>>();

        for (k, v) in changes {
            match v {
                Some(val) => std::env::set_var(k, val),
                None => std::env::remove_var(k),
            }
        }

        Self { snapshot }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (k, v) in self.snapshot.drain(..) {
            match v {
                Some(val) => std::env::set_var(&k, val),
                None => std::env::remove_var(&k),
            }
        }
    }
}

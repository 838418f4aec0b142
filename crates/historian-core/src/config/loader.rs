//! Environment variable loading.
//!
//! Keeps the primary → alias → default fallback chain in one place so callers
//! never repeat `or_else` ladders.

use std::env;
use std::path::Path;
use std::str::FromStr;

/// Load `.env` from the current directory into the process environment.
/// Existing variables are never overridden. Runs once per process.
pub fn load_dotenv() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let dir = env::current_dir().unwrap_or_else(|_| std::path::PathBuf::from("."));
        load_dotenv_from_dir(&dir);
    });
}

/// Load `<dir>/.env` (no Once guard). Returns false when the file is absent.
pub fn load_dotenv_from_dir(dir: &Path) -> bool {
    let Ok(content) = std::fs::read_to_string(dir.join(".env")) else {
        return false;
    };
    for (key, value) in parse_dotenv(&content) {
        if env::var(&key).is_err() {
            set_env_var(&key, &value);
        }
    }
    true
}

/// Parse `KEY=value` lines. Blank lines and `#` comments are skipped,
/// surrounding quotes are removed and unquoted values lose trailing `# ...`.
pub(crate) fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let mut value = raw.trim();
        let quoted = value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')));
        if quoted {
            value = &value[1..value.len() - 1];
        } else if let Some(hash) = value.find(" #") {
            value = value[..hash].trim_end();
        }
        pairs.push((key.to_string(), value.to_string()));
    }
    pairs
}

fn lookup(primary: &str, aliases: &[&str]) -> Option<String> {
    env::var(primary)
        .ok()
        .or_else(|| aliases.iter().find_map(|a| env::var(a).ok()))
}

/// Read the primary key or the first set alias; empty values fall back to `default`.
pub fn env_or<F>(primary: &str, aliases: &[&str], default: F) -> String
where
    F: FnOnce() -> String,
{
    lookup(primary, aliases)
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(default)
}

/// Like [`env_or`] but returns `None` when unset or blank.
pub fn env_optional(primary: &str, aliases: &[&str]) -> Option<String> {
    lookup(primary, aliases)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Boolean flag: `0/false/no/off` is false, any other value is true.
pub fn env_bool(primary: &str, aliases: &[&str], default: bool) -> bool {
    match lookup(primary, aliases) {
        Some(s) => !matches!(
            s.trim().to_lowercase().as_str(),
            "0" | "false" | "no" | "off"
        ),
        None => default,
    }
}

/// Parse a typed value; unparsable input logs a warning and uses `default`.
pub fn env_parse<T: FromStr>(primary: &str, aliases: &[&str], default: T) -> T {
    match env_optional(primary, aliases) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key = primary, value = %raw, "Ignoring unparsable env value");
            default
        }),
        None => default,
    }
}

// ─── Centralised set_var / remove_var ───────────────────────────────────────
//
// SAFETY contract: call before the tokio runtime spawns worker threads
// (startup, or single-threaded tests).

#[allow(unsafe_code)]
pub fn set_env_var(key: &str, value: &str) {
    unsafe { env::set_var(key, value) };
}

#[allow(unsafe_code)]
pub fn remove_env_var(key: &str) {
    unsafe { env::remove_var(key) };
}

/// RAII guard: removes the variable on drop.
pub struct ScopedEnvGuard(pub &'static str);

impl ScopedEnvGuard {
    pub fn set(key: &'static str, value: &str) -> Self {
        set_env_var(key, value);
        Self(key)
    }
}

impl Drop for ScopedEnvGuard {
    fn drop(&mut self) {
        remove_env_var(self.0);
    }
}

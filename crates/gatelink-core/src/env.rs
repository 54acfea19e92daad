//! Environment variable handling.

use std::env;

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable as a u64.
pub fn get_u64(name: &str) -> Option<u64> {
    get_var(name).and_then(|v| v.trim().parse().ok())
}

/// Load environment variables from a .env file in the working directory.
///
/// Variables that are already set are left untouched.
pub fn load_dotenv() -> Result<(), std::io::Error> {
    let path = std::path::Path::new(".env");
    if !path.exists() {
        return Ok(());
    }

    let content = std::fs::read_to_string(path)?;
    for (key, value) in parse_dotenv(&content) {
        if env::var(&key).is_err() {
            env::set_var(key, value);
        }
    }
    Ok(())
}

/// Parse `KEY=value` lines, skipping comments and stripping one layer of quotes.
fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| {
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            (key.trim().to_string(), value.to_string())
        })
        .collect()
}

/// Environment variable names read by Gatelink.
pub mod vars {
    /// Gateway WebSocket endpoint override.
    pub const GATELINK_URL: &str = "GATELINK_URL";

    /// Gateway bearer credential.
    pub const GATELINK_TOKEN: &str = "GATELINK_TOKEN";

    /// Stateless HTTP fallback endpoint.
    pub const GATELINK_HTTP_URL: &str = "GATELINK_HTTP_URL";

    /// Per-request timeout in milliseconds.
    pub const GATELINK_TIMEOUT_MS: &str = "GATELINK_TIMEOUT_MS";

    /// Gatelink home directory override.
    pub const GATELINK_HOME: &str = "GATELINK_HOME";

    /// Config file override.
    pub const GATELINK_CONFIG: &str = "GATELINK_CONFIG";
}

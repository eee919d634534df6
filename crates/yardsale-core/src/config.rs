use crate::app_config::{AppConfig, Environment};
use crate::geo::LatLng;
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the real environment so tests
/// can drive them with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::path::PathBuf;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_coord = |var: &str, default: &str, limit: f64| -> Result<f64, ConfigError> {
        let value = or_default(var, default)
            .parse::<f64>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if !value.is_finite() || value.abs() > limit {
            return Err(invalid(var, format!("must be within ±{limit}")));
        }
        Ok(value)
    };

    let api_base_url = require("YARDSALE_API_BASE_URL")?;
    if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
        return Err(invalid(
            "YARDSALE_API_BASE_URL",
            "must start with http:// or https://".to_string(),
        ));
    }
    let api_base_url = api_base_url.trim_end_matches('/').to_string();
    let api_key = lookup("YARDSALE_API_KEY").ok().filter(|k| !k.is_empty());

    let env = parse_environment(&or_default("YARDSALE_ENV", "development"));
    let log_level = or_default("YARDSALE_LOG_LEVEL", "info");
    let state_path = PathBuf::from(or_default("YARDSALE_STATE_PATH", "./.yardsale/state.json"));

    let request_timeout_secs = parse_u64("YARDSALE_REQUEST_TIMEOUT_SECS", "30")?;
    let user_agent = or_default("YARDSALE_USER_AGENT", "yardsale/0.1 (search-sync)");
    let max_retries = parse_u32("YARDSALE_MAX_RETRIES", "2")?;
    let retry_backoff_base_ms = parse_u64("YARDSALE_RETRY_BACKOFF_BASE_MS", "250")?;

    let page_size = parse_u32("YARDSALE_PAGE_SIZE", "24")?;
    if page_size == 0 {
        return Err(invalid("YARDSALE_PAGE_SIZE", "must be positive".to_string()));
    }
    let markers_limit = parse_u32("YARDSALE_MARKERS_LIMIT", "1000")?;

    let default_center = LatLng::new(
        parse_coord("YARDSALE_DEFAULT_LAT", "38.25", 90.0)?,
        parse_coord("YARDSALE_DEFAULT_LNG", "-85.75", 180.0)?,
    );

    Ok(AppConfig {
        api_base_url,
        api_key,
        env,
        log_level,
        state_path,
        request_timeout_secs,
        user_agent,
        max_retries,
        retry_backoff_base_ms,
        page_size,
        markers_limit,
        default_center,
    })
}

/// Parse a string into an `Environment` variant.
///
/// Unrecognized values default to `Environment::Development`.
fn parse_environment(s: &str) -> Environment {
    match s {
        "production" => Environment::Production,
        "test" => Environment::Test,
        _ => Environment::Development,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

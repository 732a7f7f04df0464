//! Environment variable loading.
//!
//! Every setting has a default, so an empty environment yields a usable
//! configuration. Values that are present but malformed are errors.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use super::{ServerConfig, TlsConfig};

/// Read a variable, treating empty values as unset.
pub(super) fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable, returning `Ok(None)` when unset.
pub(super) fn env_parse<T>(name: &str) -> Result<Option<T>, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {raw} ({e})")),
        None => Ok(None),
    }
}

fn env_bool(name: &str) -> Result<Option<bool>, String> {
    match env_string(name) {
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(format!("Invalid boolean for {name}: {raw}")),
        },
        None => Ok(None),
    }
}

/// Build a configuration from environment variables and defaults.
pub(super) fn from_env() -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = ServerConfig::default();

    if let Some(host) = env_string("HOST") {
        config.host = host;
    }
    if let Some(port) = env_parse::<u16>("PORT")? {
        config.port = port;
    }

    let tls_enabled = env_bool("TLS_ENABLED")?.unwrap_or(false);
    let cert_path = env_string("TLS_CERT_PATH");
    let key_path = env_string("TLS_KEY_PATH");
    if tls_enabled || (cert_path.is_some() && key_path.is_some()) {
        match (cert_path, key_path) {
            (Some(cert), Some(key)) => {
                config.tls = Some(TlsConfig {
                    cert_path: PathBuf::from(cert),
                    key_path: PathBuf::from(key),
                });
            }
            _ => return Err("TLS_ENABLED requires TLS_CERT_PATH and TLS_KEY_PATH".into()),
        }
    }

    config.gemini_api_key = env_string("GEMINI_API_KEY").or_else(|| env_string("GOOGLE_API_KEY"));
    if let Some(model) = env_string("GEMINI_MODEL") {
        config.gemini_model = model;
    }
    if let Some(version) = env_string("GEMINI_API_VERSION") {
        config.gemini_api_version = version;
    }
    if let Some(url) = env_string("GEMINI_BASE_URL") {
        config.gemini_base_url = url;
    }
    if let Some(voice) = env_string("GEMINI_VOICE") {
        config.voice_name = voice;
    }
    if let Some(language) = env_string("GEMINI_LANGUAGE_CODE") {
        config.language_code = language;
    }
    if let Some(instruction) = env_string("SYSTEM_INSTRUCTION") {
        config.system_instruction = instruction;
    }
    if let Some(timeout) = env_parse::<u64>("UPSTREAM_CONNECT_TIMEOUT_SECONDS")? {
        config.upstream_connect_timeout_seconds = timeout;
    }

    config.openweather_api_key = env_string("OPENWEATHER_API_KEY");
    if let Some(url) = env_string("WEATHER_BASE_URL") {
        config.weather_base_url = url;
    }
    if let Some(city) = env_string("DEFAULT_WEATHER_CITY") {
        config.default_weather_city = city;
    }
    if let Some(timeout) = env_parse::<u64>("WEATHER_TIMEOUT_SECONDS")? {
        config.weather_timeout_seconds = timeout;
    }

    if let Some(path) = env_string("MEMORY_PATH") {
        config.memory_path = PathBuf::from(path);
    }
    if let Some(path) = env_string("SESSION_HANDLE_PATH") {
        config.session_handle_path = PathBuf::from(path);
    }

    config.cors_allowed_origins = env_string("CORS_ALLOWED_ORIGINS");
    config.max_websocket_connections = env_parse::<usize>("MAX_WEBSOCKET_CONNECTIONS")?;
    if let Some(limit) = env_parse::<u32>("MAX_CONNECTIONS_PER_IP")? {
        config.max_connections_per_ip = limit;
    }

    Ok(config)
}

use std::path::PathBuf;

use super::yaml::YamlConfig;
use super::{ServerConfig, TlsConfig, env};

/// Merge environment configuration (base) with YAML overrides.
///
/// Every value present in the YAML file replaces the environment value.
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<ServerConfig, Box<dyn std::error::Error>> {
    let mut config = env::from_env()?;

    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(server) = yaml.server {
        if let Some(host) = server.host {
            config.host = host;
        }
        if let Some(port) = server.port {
            config.port = port;
        }
        if let Some(tls) = server.tls {
            match tls.enabled {
                Some(false) => config.tls = None,
                _ => {
                    if let (Some(cert), Some(key)) = (tls.cert_path, tls.key_path) {
                        config.tls = Some(TlsConfig {
                            cert_path: PathBuf::from(cert),
                            key_path: PathBuf::from(key),
                        });
                    } else if tls.enabled == Some(true) {
                        return Err("server.tls.enabled requires cert_path and key_path".into());
                    }
                }
            }
        }
    }

    if let Some(gemini) = yaml.gemini {
        if gemini.api_key.is_some() {
            config.gemini_api_key = gemini.api_key;
        }
        if let Some(model) = gemini.model {
            config.gemini_model = model;
        }
        if let Some(version) = gemini.api_version {
            config.gemini_api_version = version;
        }
        if let Some(url) = gemini.base_url {
            config.gemini_base_url = url;
        }
        if let Some(voice) = gemini.voice {
            config.voice_name = voice;
        }
        if let Some(language) = gemini.language_code {
            config.language_code = language;
        }
        if let Some(instruction) = gemini.system_instruction {
            config.system_instruction = instruction;
        }
        if let Some(timeout) = gemini.connect_timeout_seconds {
            config.upstream_connect_timeout_seconds = timeout;
        }
    }

    if let Some(weather) = yaml.weather {
        if weather.api_key.is_some() {
            config.openweather_api_key = weather.api_key;
        }
        if let Some(url) = weather.base_url {
            config.weather_base_url = url;
        }
        if let Some(city) = weather.default_city {
            config.default_weather_city = city;
        }
        if let Some(timeout) = weather.timeout_seconds {
            config.weather_timeout_seconds = timeout;
        }
    }

    if let Some(storage) = yaml.storage {
        if let Some(path) = storage.memory_path {
            config.memory_path = PathBuf::from(path);
        }
        if let Some(path) = storage.session_handle_path {
            config.session_handle_path = PathBuf::from(path);
        }
    }

    if let Some(security) = yaml.security {
        if security.cors_allowed_origins.is_some() {
            config.cors_allowed_origins = security.cors_allowed_origins;
        }
        if security.max_websocket_connections.is_some() {
            config.max_websocket_connections = security.max_websocket_connections;
        }
        if let Some(limit) = security.max_connections_per_ip {
            config.max_connections_per_ip = limit;
        }
    }

    Ok(config)
}

use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// server:
///   host: "0.0.0.0"
///   port: 9084
///   tls:
///     enabled: true
///     cert_path: "/etc/livegate/cert.pem"
///     key_path: "/etc/livegate/key.pem"
///
/// gemini:
///   api_key: "your-gemini-key"
///   model: "gemini-2.0-flash-live-001"
///   api_version: "v1alpha"
///   voice: "Kore"
///   language_code: "en-US"
///   system_instruction: "You are a helpful assistant"
///   connect_timeout_seconds: 10
///
/// weather:
///   api_key: "your-openweather-key"
///   default_city: "London"
///   timeout_seconds: 5
///
/// storage:
///   memory_path: "/var/lib/livegate/memory_store.json"
///   session_handle_path: "/var/lib/livegate/session_handle.json"
///
/// security:
///   cors_allowed_origins: "https://app.example.com"
///   max_websocket_connections: 500
///   max_connections_per_ip: 20
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: Option<ServerYaml>,
    pub gemini: Option<GeminiYaml>,
    pub weather: Option<WeatherYaml>,
    pub storage: Option<StorageYaml>,
    pub security: Option<SecurityYaml>,
}

/// Server configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ServerYaml {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub tls: Option<TlsYaml>,
}

/// TLS configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TlsYaml {
    pub enabled: Option<bool>,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Upstream Gemini Live settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct GeminiYaml {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub api_version: Option<String>,
    /// Override for the WebSocket host, mainly for testing against a local server
    pub base_url: Option<String>,
    pub voice: Option<String>,
    pub language_code: Option<String>,
    pub system_instruction: Option<String>,
    pub connect_timeout_seconds: Option<u64>,
}

/// Weather tool settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WeatherYaml {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_city: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Persisted state locations from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct StorageYaml {
    pub memory_path: Option<String>,
    pub session_handle_path: Option<String>,
}

/// Security settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SecurityYaml {
    pub cors_allowed_origins: Option<String>,
    pub max_websocket_connections: Option<usize>,
    pub max_connections_per_ip: Option<u32>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

//! Configuration module for the livegate server
//!
//! This module handles server configuration from various sources: .env files, YAML files,
//! and environment variables. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use livegate::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable overrides
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//!
//! println!("Server listening on {}", config.address());
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

use crate::core::realtime::SessionSetup;
use crate::core::realtime::gemini::{
    GEMINI_LIVE_API_VERSION, GEMINI_LIVE_BASE_URL, GEMINI_LIVE_MODEL, GeminiLiveConfig,
    default_tools,
};
use crate::core::tools::WeatherConfig;
use crate::core::tools::weather::{DEFAULT_WEATHER_CITY, OPENWEATHER_URL};

pub const DEFAULT_PORT: u16 = 9084;
pub const DEFAULT_VOICE: &str = "Kore";
pub const DEFAULT_LANGUAGE_CODE: &str = "en-US";
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are a helpful assistant";

/// TLS configuration for HTTPS and WSS
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Path to the TLS certificate file (PEM format)
    pub cert_path: PathBuf,
    /// Path to the TLS private key file (PEM format)
    pub key_path: PathBuf,
}

/// Server configuration
///
/// Contains everything needed to run the gateway:
/// - Server settings (host, port, TLS)
/// - Upstream Gemini Live session settings
/// - Weather tool settings
/// - Locations of the persisted memory and resumption documents
/// - Security settings (CORS, connection limits)
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // Server settings
    pub host: String,
    pub port: u16,

    // TLS configuration (optional)
    pub tls: Option<TlsConfig>,

    // Upstream settings
    /// Gemini API key, from GEMINI_API_KEY or GOOGLE_API_KEY
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_api_version: String,
    pub gemini_base_url: String,
    pub voice_name: String,
    pub language_code: String,
    pub system_instruction: String,
    pub upstream_connect_timeout_seconds: u64,

    // Weather tool
    pub openweather_api_key: Option<String>,
    pub weather_base_url: String,
    pub default_weather_city: String,
    pub weather_timeout_seconds: u64,

    // Persisted state
    pub memory_path: PathBuf,
    pub session_handle_path: PathBuf,

    // Security configuration
    /// CORS allowed origins (comma-separated list or "*" for all)
    /// Default: None (CORS disabled, same-origin only)
    pub cors_allowed_origins: Option<String>,

    // Connection limits
    /// Maximum concurrent WebSocket connections
    /// Default: None (unlimited)
    pub max_websocket_connections: Option<usize>,
    /// Maximum connections per IP address
    /// Default: 100
    pub max_connections_per_ip: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            tls: None,
            gemini_api_key: None,
            gemini_model: GEMINI_LIVE_MODEL.to_string(),
            gemini_api_version: GEMINI_LIVE_API_VERSION.to_string(),
            gemini_base_url: GEMINI_LIVE_BASE_URL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            language_code: DEFAULT_LANGUAGE_CODE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            upstream_connect_timeout_seconds: 10,
            openweather_api_key: None,
            weather_base_url: OPENWEATHER_URL.to_string(),
            default_weather_city: DEFAULT_WEATHER_CITY.to_string(),
            weather_timeout_seconds: 5,
            memory_path: PathBuf::from("memory_store.json"),
            session_handle_path: PathBuf::from("session_handle.json"),
            cors_allowed_origins: None,
            max_websocket_connections: None,
            max_connections_per_ip: 100,
        }
    }
}

/// Zeroize secret fields when the configuration is dropped.
impl Drop for ServerConfig {
    fn drop(&mut self) {
        use zeroize::Zeroize;

        if let Some(ref mut key) = self.gemini_api_key {
            key.zeroize();
        }
        if let Some(ref mut key) = self.openweather_api_key {
            key.zeroize();
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables and defaults
    ///
    /// The `.env` file is loaded into the environment in `main.rs` before this is called.
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = merge::merge_config(None)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables (actual ENV vars override .env values)
    /// 3. .env file values
    /// 4. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Get the server address as a string
    ///
    /// Returns the address in the format "host:port"
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if TLS is enabled
    pub fn is_tls_enabled(&self) -> bool {
        self.tls.is_some()
    }

    /// Connection settings for the upstream client.
    pub fn gemini_live_config(&self) -> GeminiLiveConfig {
        GeminiLiveConfig {
            api_key: self.gemini_api_key.clone().unwrap_or_default(),
            base_url: self.gemini_base_url.clone(),
            api_version: self.gemini_api_version.clone(),
            connect_timeout: Duration::from_secs(self.upstream_connect_timeout_seconds),
        }
    }

    pub fn weather_config(&self) -> WeatherConfig {
        WeatherConfig {
            api_key: self.openweather_api_key.clone().unwrap_or_default(),
            base_url: self.weather_base_url.clone(),
            default_city: self.default_weather_city.clone(),
            timeout: Duration::from_secs(self.weather_timeout_seconds),
        }
    }

    /// Session parameters for a new upstream session.
    pub fn session_setup(&self, resumption_handle: Option<String>) -> SessionSetup {
        SessionSetup {
            model: self.gemini_model.clone(),
            voice_name: self.voice_name.clone(),
            language_code: self.language_code.clone(),
            system_instruction: self.system_instruction.clone(),
            resumption_handle,
            tools: default_tools(),
        }
    }
}

use super::ServerConfig;

/// Validate a merged configuration.
///
/// # Errors
/// Returns an error if:
/// - The port is zero
/// - Any timeout is zero
/// - TLS is configured but the certificate or key file does not exist
pub(super) fn validate(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.port == 0 {
        return Err("PORT must be greater than zero".into());
    }

    if config.upstream_connect_timeout_seconds == 0 {
        return Err("Upstream connect timeout must be greater than zero".into());
    }

    if config.weather_timeout_seconds == 0 {
        return Err("Weather timeout must be greater than zero".into());
    }

    if let Some(tls) = &config.tls {
        if !tls.cert_path.exists() {
            return Err(format!(
                "TLS certificate file not found: {}",
                tls.cert_path.display()
            )
            .into());
        }
        if !tls.key_path.exists() {
            return Err(format!("TLS key file not found: {}", tls.key_path.display()).into());
        }
    }

    if config.gemini_api_key.is_none() {
        tracing::warn!(
            "No Gemini API key configured (GEMINI_API_KEY or GOOGLE_API_KEY); live sessions will fail"
        );
    }

    Ok(())
}

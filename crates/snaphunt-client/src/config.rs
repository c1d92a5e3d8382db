use url::Url;

use crate::capture::FrameSize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("server url must be http or https, got {0}")]
    UnsupportedScheme(String),
    #[error("preview size must not be empty ({width}x{height})")]
    EmptyPreview { width: u32, height: u32 },
}

/// Endpoints and capture settings resolved from the single base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP base, always ending in `/` so relative joins stay below it.
    pub api_base: Url,
    /// WebSocket endpoint of the real-time channel.
    pub channel_url: Url,
    pub preview: FrameSize,
}

impl ClientConfig {
    pub fn new(base_url: &str, preview: FrameSize) -> Result<Self, ConfigError> {
        if preview.width == 0 || preview.height == 0 {
            return Err(ConfigError::EmptyPreview {
                width: preview.width,
                height: preview.height,
            });
        }

        let mut api_base = Url::parse(base_url)?;
        let ws_scheme = match api_base.scheme() {
            "http" => "ws",
            "https" => "wss",
            other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
        };
        if !api_base.path().ends_with('/') {
            let path = format!("{}/", api_base.path());
            api_base.set_path(&path);
        }

        let mut channel_url = api_base.join("channel")?;
        channel_url
            .set_scheme(ws_scheme)
            .map_err(|()| ConfigError::UnsupportedScheme(ws_scheme.to_string()))?;

        Ok(Self {
            api_base,
            channel_url,
            preview,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::DEFAULT_PREVIEW_SIZE;

    #[test]
    fn test_channel_derived_from_base() {
        let config = ClientConfig::new("http://127.0.0.1:8080/api", DEFAULT_PREVIEW_SIZE).unwrap();
        assert_eq!(config.api_base.as_str(), "http://127.0.0.1:8080/api/");
        assert_eq!(config.channel_url.as_str(), "ws://127.0.0.1:8080/api/channel");
    }

    #[test]
    fn test_https_becomes_wss() {
        let config = ClientConfig::new("https://snap.example.org/", DEFAULT_PREVIEW_SIZE).unwrap();
        assert_eq!(config.channel_url.as_str(), "wss://snap.example.org/channel");
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            ClientConfig::new("ftp://example.org", DEFAULT_PREVIEW_SIZE),
            Err(ConfigError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            ClientConfig::new("not a url", DEFAULT_PREVIEW_SIZE),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_rejects_empty_preview() {
        assert!(matches!(
            ClientConfig::new("http://localhost", FrameSize::new(0, 200)),
            Err(ConfigError::EmptyPreview { width: 0, .. })
        ));
    }
}

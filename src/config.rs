use anyhow::{Context, Result};
use std::path::PathBuf;

/// Lowest port the control surface will accept for the redirect listener.
pub const MIN_PORT: u16 = 1024;

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Interface to bind the redirect listener to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on. Falls back to an OS-assigned port if taken.
    pub port: u16,

    /// Host name used when rendering short URLs, e.g. "localhost".
    /// The effective listener port is appended at display time.
    pub public_host: String,

    /// Path of the persisted link table (CSV)
    pub data_file: PathBuf,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        let port = std::env::var("PORT").unwrap_or_else(|_| "8080".into());
        let port = parse_port(&port)?;

        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            public_host: std::env::var("PUBLIC_HOST")
                .unwrap_or_else(|_| "localhost".into())
                .trim_end_matches('/')
                .to_owned(),
            data_file: std::env::var("DATA_FILE")
                .unwrap_or_else(|_| "urls.csv".into())
                .into(),
        })
    }
}

/// Parse a user-supplied port and check it against the accepted range.
pub fn parse_port(raw: &str) -> Result<u16> {
    let port = raw
        .trim()
        .parse::<u16>()
        .with_context(|| format!("'{raw}' is not a valid port number"))?;

    if port < MIN_PORT {
        anyhow::bail!("port {port} is out of range ({MIN_PORT}–65535)");
    }

    Ok(port)
}

//! Server configuration from command-line flags and environment.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::network::{NetworkConfig, TlsConfig};
use crate::sheets::GoogleSheetsClient;

/// `sheetsync-server` command line. Every flag has an environment fallback.
#[derive(Debug, Clone, Parser)]
#[command(name = "sheetsync-server", about = "SheetSync API server")]
pub struct ServerArgs {
    #[arg(long, env = "SHEETSYNC_HOST", default_value = "0.0.0.0")]
    pub host: String,
    #[arg(long, env = "SHEETSYNC_PORT", default_value_t = 5500)]
    pub port: u16,
    /// Secret used to sign bearer tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    #[arg(long, env = "SHEETSYNC_TOKEN_TTL_SECS", default_value_t = 3600)]
    pub token_ttl_secs: u64,
    /// Google Sheets API key. Unset, every sheet request fails with 502.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Spreadsheet service base URL.
    #[arg(long, env = "SHEETSYNC_SHEETS_URL", default_value = GoogleSheetsClient::DEFAULT_BASE_URL)]
    pub sheets_url: String,
    /// Tab read when a request names none.
    #[arg(long, env = "SHEETSYNC_SHEET_NAME", default_value = "Sheet1")]
    pub sheet_name: String,
    /// Comma-separated allowed CORS origins; `*` allows any.
    #[arg(long, env = "SHEETSYNC_CORS_ORIGINS", value_delimiter = ',', default_value = "*")]
    pub cors_origins: Vec<String>,
    #[arg(long, env = "SHEETSYNC_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,
    #[arg(long, env = "SHEETSYNC_TLS_CERT", requires = "tls_key")]
    pub tls_cert: Option<PathBuf>,
    #[arg(long, env = "SHEETSYNC_TLS_KEY", requires = "tls_cert")]
    pub tls_key: Option<PathBuf>,
    /// Emit logs as JSON lines.
    #[arg(long, env = "SHEETSYNC_LOG_JSON", default_value_t = false)]
    pub log_json: bool,
}

/// Token settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl: Duration,
}

/// Spreadsheet service settings.
#[derive(Debug, Clone)]
pub struct SheetsConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub default_sheet_name: String,
    pub request_timeout: Duration,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub network: NetworkConfig,
    pub auth: AuthConfig,
    pub sheets: SheetsConfig,
    pub log_json: bool,
}

impl ServerArgs {
    /// # Errors
    ///
    /// Returns an error for a blank JWT secret or blank default sheet name.
    pub fn into_config(self) -> anyhow::Result<ServerConfig> {
        if self.jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be blank");
        }
        if self.sheet_name.trim().is_empty() {
            anyhow::bail!("sheet name must not be blank");
        }
        let request_timeout = Duration::from_secs(self.request_timeout_secs);
        let tls = match (self.tls_cert, self.tls_key) {
            (Some(cert_path), Some(key_path)) => Some(TlsConfig {
                cert_path,
                key_path,
            }),
            _ => None,
        };
        let cors_origins = self
            .cors_origins
            .into_iter()
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(ServerConfig {
            network: NetworkConfig {
                host: self.host,
                port: self.port,
                tls,
                cors_origins,
                request_timeout,
                ..NetworkConfig::default()
            },
            auth: AuthConfig {
                jwt_secret: self.jwt_secret,
                token_ttl: Duration::from_secs(self.token_ttl_secs),
            },
            sheets: SheetsConfig {
                base_url: self.sheets_url,
                api_key: self.api_key,
                default_sheet_name: self.sheet_name,
                request_timeout,
            },
            log_json: self.log_json,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<ServerArgs, clap::Error> {
        ServerArgs::try_parse_from(std::iter::once("sheetsync-server").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_resolve() {
        let config = parse(&["--jwt-secret", "s"]).unwrap().into_config().unwrap();
        assert_eq!(config.network.port, 5500);
        assert_eq!(config.network.cors_origins, vec!["*"]);
        assert!(config.network.tls.is_none());
        assert_eq!(config.auth.token_ttl, Duration::from_secs(3600));
        assert_eq!(config.sheets.default_sheet_name, "Sheet1");
        assert_eq!(config.sheets.base_url, "https://sheets.googleapis.com");
    }

    #[test]
    fn cors_origins_split_on_commas() {
        let config = parse(&[
            "--jwt-secret",
            "s",
            "--cors-origins",
            "https://a.example, https://b.example",
        ])
        .unwrap()
        .into_config()
        .unwrap();
        assert_eq!(
            config.network.cors_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn tls_needs_both_paths() {
        assert!(parse(&["--jwt-secret", "s", "--tls-cert", "c.pem"]).is_err());
        let config = parse(&["--jwt-secret", "s", "--tls-cert", "c.pem", "--tls-key", "k.pem"])
            .unwrap()
            .into_config()
            .unwrap();
        assert_eq!(config.network.tls.unwrap().key_path, PathBuf::from("k.pem"));
    }

    #[test]
    fn blank_secret_is_rejected() {
        assert!(parse(&["--jwt-secret", " "]).unwrap().into_config().is_err());
    }
}

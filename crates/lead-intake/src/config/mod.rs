use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub leads: LeadConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(&env_or("APP_ENV", "development"));

        let host = env_or("APP_HOST", "127.0.0.1");
        let port = env_or("APP_PORT", "3000")
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env_or("APP_LOG_LEVEL", "info");
        let log_format = LogFormat::from_str(&env_or(
            "APP_LOG_FORMAT",
            if environment == AppEnvironment::Production {
                "json"
            } else {
                "compact"
            },
        ));

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            leads: LeadConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

/// Relay endpoints, keys and limits used by the lead forms.
#[derive(Clone)]
pub struct LeadConfig {
    pub relay_timeout: Duration,
    pub target_email: String,
    pub contact_relay_url: Url,
    pub contact_access_key: String,
    pub consultation_relay_url: Url,
    pub emailjs: EmailJsConfig,
    pub mitigation: MitigationConfig,
    pub admin_emails: Vec<String>,
    pub flag_store_path: Option<PathBuf>,
}

impl fmt::Debug for LeadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeadConfig")
            .field("relay_timeout", &self.relay_timeout)
            .field("target_email", &self.target_email)
            .field("contact_relay_url", &self.contact_relay_url.as_str())
            .field("contact_access_key", &"[REDACTED]")
            .field("consultation_relay_url", &self.consultation_relay_url.as_str())
            .field("emailjs", &self.emailjs)
            .field("mitigation", &self.mitigation)
            .field("admin_emails", &self.admin_emails.len())
            .field("flag_store_path", &self.flag_store_path)
            .finish()
    }
}

impl LeadConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let relay_timeout = Duration::from_secs(env_number("LEAD_RELAY_TIMEOUT_SECS", 15)?);
        let ready_timeout =
            Duration::from_millis(env_number("LEAD_MITIGATION_READY_TIMEOUT_MS", 5_000)?);

        let admin_emails = env::var("LEAD_ADMIN_EMAILS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|email| !email.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            relay_timeout,
            target_email: env_or("LEAD_TARGET_EMAIL", "info@example.com"),
            contact_relay_url: env_url(
                "LEAD_CONTACT_RELAY_URL",
                "https://api.web3forms.com/submit",
            )?,
            contact_access_key: env_or("LEAD_CONTACT_ACCESS_KEY", ""),
            consultation_relay_url: env_url(
                "LEAD_CONSULTATION_RELAY_URL",
                "https://formspree.io/f/consultation",
            )?,
            emailjs: EmailJsConfig {
                url: env_url(
                    "LEAD_EMAILJS_URL",
                    "https://api.emailjs.com/api/v1.0/email/send",
                )?,
                service_id: env_or("LEAD_EMAILJS_SERVICE_ID", ""),
                newsletter_template: env_or("LEAD_EMAILJS_TEMPLATE_NEWSLETTER", ""),
                confirmation_template: env_or("LEAD_EMAILJS_TEMPLATE_CONFIRMATION", ""),
                public_key: env_or("LEAD_EMAILJS_PUBLIC_KEY", ""),
            },
            mitigation: MitigationConfig {
                site_key: env_or("LEAD_MITIGATION_SITE_KEY", ""),
                ready_timeout,
            },
            admin_emails,
            flag_store_path: env::var("LEAD_FLAG_STORE_PATH")
                .ok()
                .filter(|path| !path.trim().is_empty())
                .map(PathBuf::from),
        })
    }
}

/// EmailJS REST settings shared by the newsletter forms.
#[derive(Clone)]
pub struct EmailJsConfig {
    pub url: Url,
    pub service_id: String,
    pub newsletter_template: String,
    pub confirmation_template: String,
    pub public_key: String,
}

impl fmt::Debug for EmailJsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailJsConfig")
            .field("url", &self.url.as_str())
            .field("service_id", &self.service_id)
            .field("newsletter_template", &self.newsletter_template)
            .field("confirmation_template", &self.confirmation_template)
            .field("public_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MitigationConfig {
    pub site_key: String,
    pub ready_timeout: Duration,
}

fn env_or(var: &str, default: &str) -> String {
    env::var(var).unwrap_or_else(|_| default.to_string())
}

fn env_url(var: &'static str, default: &str) -> Result<Url, ConfigError> {
    Url::parse(&env_or(var, default)).map_err(|source| ConfigError::InvalidUrl { var, source })
}

fn env_number(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidUrl {
        var: &'static str,
        source: url::ParseError,
    },
    InvalidNumber {
        var: &'static str,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUrl { var, .. } => write!(f, "{var} must be an absolute URL"),
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be a non-negative integer")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidUrl { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        for var in [
            "APP_ENV",
            "APP_HOST",
            "APP_PORT",
            "APP_LOG_LEVEL",
            "APP_LOG_FORMAT",
            "LEAD_RELAY_TIMEOUT_SECS",
            "LEAD_CONTACT_RELAY_URL",
            "LEAD_MITIGATION_READY_TIMEOUT_MS",
            "LEAD_ADMIN_EMAILS",
            "LEAD_FLAG_STORE_PATH",
        ] {
            env::remove_var(var);
        }
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.telemetry.format, LogFormat::Compact);
        assert_eq!(config.leads.relay_timeout, Duration::from_secs(15));
        assert_eq!(
            config.leads.mitigation.ready_timeout,
            Duration::from_millis(5_000)
        );
        assert!(config.leads.admin_emails.is_empty());
        assert!(config.leads.flag_store_path.is_none());
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn parses_admin_allow_list_and_timeouts() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEAD_ADMIN_EMAILS", " anne@example.com, ,ops@example.com ");
        env::set_var("LEAD_RELAY_TIMEOUT_SECS", "4");
        env::set_var("APP_ENV", "production");
        let config = AppConfig::load().expect("config loads");
        assert_eq!(
            config.leads.admin_emails,
            vec!["anne@example.com".to_string(), "ops@example.com".to_string()]
        );
        assert_eq!(config.leads.relay_timeout, Duration::from_secs(4));
        assert_eq!(config.telemetry.format, LogFormat::Json);
        reset_env();
    }

    #[test]
    fn rejects_relative_relay_url() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LEAD_CONTACT_RELAY_URL", "/submit");
        let err = AppConfig::load().expect_err("relative url rejected");
        assert!(matches!(
            err,
            ConfigError::InvalidUrl {
                var: "LEAD_CONTACT_RELAY_URL",
                ..
            }
        ));
        reset_env();
    }
}

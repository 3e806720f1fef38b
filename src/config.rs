//! Service configuration from command-line flags and environment variables.
//!
//! Every flag can also be set through the environment variable named next to it,
//! which is how deployments usually configure the SMTP relay.

use std::net::SocketAddr;

use clap::{Parser, ValueEnum};

use crate::dispatch::DispatcherConfig;
use crate::error::{DispatchError, Result};
use crate::transport::SmtpConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "rollcall", version, about = "Bulk notification dispatch service")]
pub struct ServiceArgs {
    /// Full bind address; takes precedence over --port.
    #[arg(long, env = "BIND_ADDRESS")]
    pub bind: Option<String>,

    /// Port to listen on (all interfaces).
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Recipients sent to concurrently per batch.
    #[arg(long, env = "DISPATCH_BATCH_SIZE", default_value_t = 10)]
    pub batch_size: usize,

    /// Per-send timeout in milliseconds.
    #[arg(long, env = "DISPATCH_SEND_TIMEOUT_MS")]
    pub send_timeout_ms: Option<u64>,

    /// Overall dispatch deadline in milliseconds.
    #[arg(long, env = "DISPATCH_DEADLINE_MS")]
    pub dispatch_deadline_ms: Option<u64>,

    #[arg(long, env = "SMTP_HOST", default_value = "")]
    pub smtp_host: String,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    /// Implicit TLS only when exactly "true"; STARTTLS otherwise.
    #[arg(long, env = "SMTP_SECURE", default_value = "false")]
    pub smtp_secure: String,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    #[arg(long, env = "SMTP_FROM_ADDRESS", default_value = "")]
    pub smtp_from_address: String,

    #[arg(long, env = "SMTP_FROM_NAME", default_value = "Tryout Coordinator")]
    pub smtp_from_name: String,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl ServiceArgs {
    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let raw = self
            .bind
            .clone()
            .unwrap_or_else(|| format!("0.0.0.0:{}", self.port));
        raw.parse()
            .map_err(|e| DispatchError::Config(format!("Invalid bind address '{}': {}", raw, e)))
    }

    pub fn dispatcher_config(&self) -> Result<DispatcherConfig> {
        let config = DispatcherConfig {
            batch_size: self.batch_size,
            send_timeout_ms: self.send_timeout_ms,
            dispatch_deadline_ms: self.dispatch_deadline_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn smtp_config(&self) -> SmtpConfig {
        SmtpConfig {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            secure: self.smtp_secure == "true",
            user: self.smtp_user.clone().filter(|u| !u.is_empty()),
            password: self.smtp_pass.clone(),
            from_address: self.smtp_from_address.clone(),
            from_name: self.smtp_from_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServiceArgs {
        let mut argv = vec!["rollcall"];
        argv.extend_from_slice(args);
        ServiceArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_bind_addr_from_port_or_bind() {
        // BIND_ADDRESS may be set in the environment; --port only applies without it
        let mut args = parse(&["--port", "8080"]);
        args.bind = None;
        assert_eq!(args.bind_addr().unwrap().to_string(), "0.0.0.0:8080");

        let args = parse(&["--bind", "127.0.0.1:9000"]);
        assert_eq!(args.bind_addr().unwrap().to_string(), "127.0.0.1:9000");

        let args = parse(&["--bind", "not-an-address"]);
        assert!(matches!(args.bind_addr(), Err(DispatchError::Config(_))));
    }

    #[test]
    fn test_dispatcher_config_rejects_zero_batch() {
        let args = parse(&["--batch-size", "0"]);
        assert!(args.dispatcher_config().is_err());

        let args = parse(&["--batch-size", "25", "--send-timeout-ms", "5000"]);
        let config = args.dispatcher_config().unwrap();
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.send_timeout_ms, Some(5000));
    }

    #[test]
    fn test_smtp_secure_only_when_exactly_true() {
        let secure = parse(&["--smtp-secure", "true"]).smtp_config();
        assert!(secure.secure);

        for value in ["TRUE", "1", "yes", "false"] {
            let config = parse(&["--smtp-secure", value]).smtp_config();
            assert!(!config.secure, "{} should not enable implicit TLS", value);
        }
    }

    #[test]
    fn test_smtp_config_mapping() {
        let config = parse(&[
            "--smtp-host",
            "smtp.example.com",
            "--smtp-port",
            "465",
            "--smtp-user",
            "mailer",
            "--smtp-pass",
            "secret",
            "--smtp-from-address",
            "tryouts@example.com",
        ])
        .smtp_config();

        assert_eq!(config.host, "smtp.example.com");
        assert_eq!(config.port, 465);
        assert_eq!(config.user.as_deref(), Some("mailer"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.from_address, "tryouts@example.com");
    }
}

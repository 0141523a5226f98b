use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use thiserror::Error;
use url::Url;

use crate::db::DEFAULT_MAX_POOL_SIZE;
use crate::models::DocumentStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{tool} binary not found; install it or set {variable}")]
    ToolMissing { tool: String, variable: &'static str },
    #[error("{channel} channel is partially configured: {missing} must be set")]
    IncompleteChannel {
        channel: &'static str,
        missing: &'static str,
    },
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_pool_size: u32,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origin: Option<String>,
    pub base_id_url: String,
    pub aws_endpoint_url: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: String,
    pub s3_bucket: String,
    pub storage_timeout: Duration,
    pub presign_expiry: Duration,
    pub client_read_token: Option<String>,
    pub hook_token: Option<String>,
    pub notifications: NotificationConfig,
    pub audit: AuditConfig,
    pub extraction: ExtractionConfig,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub log_path: PathBuf,
    pub channel_timeout: Duration,
    pub email: Option<SmtpConfig>,
    pub matrix: Option<MatrixConfig>,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("logs/notifications.log"),
            channel_timeout: Duration::from_secs(15),
            email: None,
            matrix: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub from: String,
    pub to: String,
}

#[derive(Clone, Debug)]
pub struct MatrixConfig {
    pub homeserver: String,
    pub access_token: String,
    pub room_id: String,
}

#[derive(Clone, Debug)]
pub struct AuditConfig {
    pub interval: Duration,
    pub batch_size: usize,
    pub statuses: Vec<DocumentStatus>,
    pub concurrency: usize,
    pub log_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            batch_size: 50,
            statuses: vec![DocumentStatus::Registered, DocumentStatus::Delivered],
            concurrency: 4,
            log_path: PathBuf::from("logs/reports_integrity.jsonl"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ExtractionConfig {
    pub enabled: bool,
    pub languages: String,
    pub dpi: u32,
    pub max_pages: u32,
    pub preprocess: bool,
    pub verbose: bool,
    pub tool_timeout: Duration,
    pub pdftoppm_bin: String,
    pub pdfinfo_bin: String,
    pub tesseract_bin: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            languages: "eng".to_string(),
            dpi: 300,
            max_pages: 35,
            preprocess: true,
            verbose: false,
            tool_timeout: Duration::from_secs(120),
            pdftoppm_bin: "pdftoppm".to_string(),
            pdfinfo_bin: "pdfinfo".to_string(),
            tesseract_bin: "tesseract".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let database_url = var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_pool_size =
            parse_or(&var, "DATABASE_MAX_POOL_SIZE", DEFAULT_MAX_POOL_SIZE)?;
        let server_host = var("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let server_port = parse_or(&var, "SERVER_PORT", 8000u16)?;
        let cors_allowed_origin = var("CORS_ALLOWED_ORIGIN");
        let base_id_url = var("BASE_ID_URL")
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();
        Url::parse(&base_id_url).context("BASE_ID_URL must be an absolute URL")?;

        let aws_endpoint_url = var("AWS_ENDPOINT_URL");
        let aws_access_key_id = var("AWS_ACCESS_KEY_ID");
        let aws_secret_access_key = var("AWS_SECRET_ACCESS_KEY");
        let aws_region = var("AWS_REGION").unwrap_or_else(|| "us-east-1".to_string());
        let s3_bucket = var("S3_BUCKET").context("S3_BUCKET must be set")?;
        let storage_timeout = Duration::from_secs(parse_or(&var, "STORAGE_TIMEOUT_SECS", 60u64)?);
        let presign_expiry = Duration::from_secs(parse_or(&var, "PRESIGN_EXPIRY_SECS", 300u64)?);

        let client_read_token = var("CLIENT_READ_TOKEN");
        let hook_token = var("HOOK_TOKEN");

        let email = match var("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: parse_or(&var, "SMTP_PORT", 587u16)?,
                user: var("SMTP_USER"),
                password: var("SMTP_PASS"),
                from: var("EMAIL_FROM").ok_or(ConfigError::IncompleteChannel {
                    channel: "email",
                    missing: "EMAIL_FROM",
                })?,
                to: var("EMAIL_TO").ok_or(ConfigError::IncompleteChannel {
                    channel: "email",
                    missing: "EMAIL_TO",
                })?,
            }),
            None => None,
        };

        let matrix = match (
            var("MATRIX_HOMESERVER"),
            var("MATRIX_ACCESS_TOKEN"),
            var("MATRIX_ROOM_ID"),
        ) {
            (Some(homeserver), Some(access_token), Some(room_id)) => Some(MatrixConfig {
                homeserver: homeserver.trim_end_matches('/').to_string(),
                access_token,
                room_id,
            }),
            (None, None, None) => None,
            (_, None, _) => {
                return Err(ConfigError::IncompleteChannel {
                    channel: "chat",
                    missing: "MATRIX_ACCESS_TOKEN",
                }
                .into())
            }
            (None, _, _) => {
                return Err(ConfigError::IncompleteChannel {
                    channel: "chat",
                    missing: "MATRIX_HOMESERVER",
                }
                .into())
            }
            (_, _, None) => {
                return Err(ConfigError::IncompleteChannel {
                    channel: "chat",
                    missing: "MATRIX_ROOM_ID",
                }
                .into())
            }
        };

        let notification_defaults = NotificationConfig::default();
        let notifications = NotificationConfig {
            log_path: var("NOTIF_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(notification_defaults.log_path),
            channel_timeout: Duration::from_secs(parse_or(&var, "CHANNEL_TIMEOUT_SECS", 15u64)?),
            email,
            matrix,
        };

        let audit_defaults = AuditConfig::default();
        let statuses = match var("INTEGRITY_INCLUDE_STATUSES") {
            Some(raw) => DocumentStatus::parse_list(&raw)
                .map_err(|err| anyhow!("INTEGRITY_INCLUDE_STATUSES: {err}"))?,
            None => audit_defaults.statuses,
        };
        let interval_minutes: u64 = parse_or(&var, "INTEGRITY_INTERVAL_MIN", 60u64)?;
        let audit = AuditConfig {
            interval: Duration::from_secs(interval_minutes.max(1) * 60),
            batch_size: parse_or(&var, "INTEGRITY_BATCH", audit_defaults.batch_size)?,
            statuses,
            concurrency: parse_or(&var, "INTEGRITY_CONCURRENCY", audit_defaults.concurrency)?
                .max(1),
            log_path: var("INTEGRITY_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or(audit_defaults.log_path),
        };

        let extraction_defaults = ExtractionConfig::default();
        let extraction = ExtractionConfig {
            enabled: flag_or(&var, "OCR_ENABLED", extraction_defaults.enabled),
            languages: var("OCR_LANGUAGES").unwrap_or(extraction_defaults.languages),
            dpi: parse_or(&var, "OCR_DPI", extraction_defaults.dpi)?,
            max_pages: parse_or(&var, "OCR_MAX_PAGES", extraction_defaults.max_pages)?.max(1),
            preprocess: flag_or(&var, "OCR_PREPROCESS", extraction_defaults.preprocess),
            verbose: flag_or(&var, "OCR_VERBOSE", extraction_defaults.verbose),
            tool_timeout: Duration::from_secs(parse_or(&var, "OCR_TOOL_TIMEOUT_SECS", 120u64)?),
            pdftoppm_bin: var("PDFTOPPM_BIN").unwrap_or(extraction_defaults.pdftoppm_bin),
            pdfinfo_bin: var("PDFINFO_BIN").unwrap_or(extraction_defaults.pdfinfo_bin),
            tesseract_bin: var("TESSERACT_BIN").unwrap_or(extraction_defaults.tesseract_bin),
        };

        Ok(Self {
            database_url,
            database_max_pool_size,
            server_host,
            server_port,
            cors_allowed_origin,
            base_id_url,
            aws_endpoint_url,
            aws_access_key_id,
            aws_secret_access_key,
            aws_region,
            s3_bucket,
            storage_timeout,
            presign_expiry,
            client_read_token,
            hook_token,
            notifications,
            audit,
            extraction,
        })
    }

    pub fn redacted_database_url(&self) -> String {
        redact_database_url(&self.database_url)
    }
}

fn parse_or<F, T>(var: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match var(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|err| anyhow!("{name} is invalid ({raw}): {err}")),
        None => Ok(default),
    }
}

fn flag_or<F>(var: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    var(name)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
        .unwrap_or(default)
}

fn redact_database_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut parsed) => {
            let _ = parsed.set_password(Some("*****"));
            parsed.to_string()
        }
        Err(_) => "***".to_string(),
    }
}

use std::env;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtaModel {
    Fixed,
    Distance,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub notification_queue_size: usize,
    pub routing: RouteSettings,
}

/// Knobs the route builder and service layer read at runtime.
#[derive(Debug, Clone)]
pub struct RouteSettings {
    pub stop_duration_minutes: i64,
    pub default_max_capacity: u32,
    pub eta_model: EtaModel,
    pub average_speed_kmh: f64,
}

impl Default for RouteSettings {
    fn default() -> Self {
        Self {
            stop_duration_minutes: 8,
            default_max_capacity: 25,
            eta_model: EtaModel::Fixed,
            average_speed_kmh: 25.0,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let defaults = RouteSettings::default();
        let routing = RouteSettings {
            stop_duration_minutes: parse_or_default(
                "STOP_DURATION_MINUTES",
                defaults.stop_duration_minutes,
            )?,
            default_max_capacity: parse_or_default(
                "DEFAULT_MAX_CAPACITY",
                defaults.default_max_capacity,
            )?,
            eta_model: parse_eta_model(env::var("ETA_MODEL").ok().as_deref())?,
            average_speed_kmh: parse_or_default("AVERAGE_SPEED_KMH", defaults.average_speed_kmh)?,
        };

        if routing.stop_duration_minutes < 0 {
            return Err(AppError::Internal(
                "invalid STOP_DURATION_MINUTES: must not be negative".to_string(),
            ));
        }
        if routing.average_speed_kmh <= 0.0 {
            return Err(AppError::Internal(
                "invalid AVERAGE_SPEED_KMH: must be > 0".to_string(),
            ));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_log_format(env::var("LOG_FORMAT").ok().as_deref())?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            notification_queue_size: parse_or_default("NOTIFICATION_QUEUE_SIZE", 1024)?,
            routing,
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

fn parse_log_format(raw: Option<&str>) -> Result<LogFormat, AppError> {
    match raw.map(str::trim) {
        None | Some("") | Some("compact") => Ok(LogFormat::Compact),
        Some("json") => Ok(LogFormat::Json),
        Some(other) => Err(AppError::Internal(format!(
            "invalid LOG_FORMAT: {other}, expected compact/json"
        ))),
    }
}

fn parse_eta_model(raw: Option<&str>) -> Result<EtaModel, AppError> {
    match raw.map(str::trim) {
        None | Some("") | Some("fixed") => Ok(EtaModel::Fixed),
        Some("distance") => Ok(EtaModel::Distance),
        Some(other) => Err(AppError::Internal(format!(
            "invalid ETA_MODEL: {other}, expected fixed/distance"
        ))),
    }
}

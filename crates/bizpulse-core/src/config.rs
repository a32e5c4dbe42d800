use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Decoupled from the real environment so it can be tested with a plain
/// `HashMap` lookup.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let parse_num = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let raw = or_default(var, default);
        raw.trim()
            .parse::<i64>()
            .map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
    };

    let positive = |var: &str, default: &str| -> Result<i64, ConfigError> {
        let value = parse_num(var, default)?;
        if value <= 0 {
            return Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("must be positive, got {value}"),
            });
        }
        Ok(value)
    };

    let parse_bool = |var: &str, default: &str| -> Result<bool, ConfigError> {
        match or_default(var, default).trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: format!("expected a boolean, got \"{other}\""),
            }),
        }
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("BIZPULSE_ENV", "development"))?;
    let log_level = or_default("BIZPULSE_LOG_LEVEL", "info");

    let db_max_connections = to_u32(
        "BIZPULSE_DB_MAX_CONNECTIONS",
        positive("BIZPULSE_DB_MAX_CONNECTIONS", "10")?,
    )?;
    let db_min_connections = to_u32(
        "BIZPULSE_DB_MIN_CONNECTIONS",
        parse_num("BIZPULSE_DB_MIN_CONNECTIONS", "1")?,
    )?;
    if db_min_connections > db_max_connections {
        return Err(ConfigError::InvalidEnvVar {
            var: "BIZPULSE_DB_MIN_CONNECTIONS".to_string(),
            reason: format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        });
    }
    let db_acquire_timeout_secs =
        positive("BIZPULSE_DB_ACQUIRE_TIMEOUT_SECS", "10")?.unsigned_abs();

    let model_url = lookup("BIZPULSE_MODEL_URL")
        .ok()
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty());
    let model_name = or_default("BIZPULSE_MODEL_NAME", "llama3");
    let model_timeout_secs = positive("BIZPULSE_MODEL_TIMEOUT_SECS", "15")?;
    if model_timeout_secs > 60 {
        return Err(ConfigError::InvalidEnvVar {
            var: "BIZPULSE_MODEL_TIMEOUT_SECS".to_string(),
            reason: format!("must be at most 60 seconds, got {model_timeout_secs}"),
        });
    }

    let active_client_hours = positive("BIZPULSE_ACTIVE_CLIENT_HOURS", "168")?;
    let kpi_period_days = positive("BIZPULSE_KPI_PERIOD_DAYS", "30")?;
    let trend_window_short_days = positive("BIZPULSE_TREND_WINDOW_SHORT_DAYS", "7")?;
    let trend_window_long_days = positive("BIZPULSE_TREND_WINDOW_LONG_DAYS", "30")?;
    if trend_window_short_days >= trend_window_long_days {
        return Err(ConfigError::InvalidEnvVar {
            var: "BIZPULSE_TREND_WINDOW_SHORT_DAYS".to_string(),
            reason: format!(
                "short window ({trend_window_short_days}d) must be shorter than long window ({trend_window_long_days}d)"
            ),
        });
    }
    let trend_keep_stable = parse_bool("BIZPULSE_TREND_KEEP_STABLE", "false")?;
    let insight_days_back = positive("BIZPULSE_INSIGHT_DAYS_BACK", "7")?;
    let text_batch_limit = positive("BIZPULSE_TEXT_BATCH_LIMIT", "100")?;
    let max_concurrent_clients =
        usize::try_from(positive("BIZPULSE_MAX_CONCURRENT_CLIENTS", "4")?).map_err(|e| {
            ConfigError::InvalidEnvVar {
                var: "BIZPULSE_MAX_CONCURRENT_CLIENTS".to_string(),
                reason: e.to_string(),
            }
        })?;
    let pipeline_cron = or_default("BIZPULSE_PIPELINE_CRON", "0 0 3 * * *");

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        model_url,
        model_name,
        model_timeout_secs: model_timeout_secs.unsigned_abs(),
        active_client_hours,
        kpi_period_days,
        trend_window_short_days,
        trend_window_long_days,
        trend_keep_stable,
        insight_days_back,
        text_batch_limit,
        max_concurrent_clients,
        pipeline_cron,
    })
}

fn to_u32(var: &str, value: i64) -> Result<u32, ConfigError> {
    u32::try_from(value).map_err(|e| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "BIZPULSE_ENV".to_string(),
            reason: format!("unknown environment \"{other}\""),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

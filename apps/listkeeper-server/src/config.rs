// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is read from the environment once at startup into an
//! immutable [`AuthSettings`], shared by every component.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `3030` |
//! | `DATA_DIR` | Directory holding `auth.redb` | `./data` |
//! | `APP_ENV` | `production` enables `Secure` + `__Host-` cookies | `production` |
//! | `JWT_SECRET` | Access-token HMAC secret (≥ 32 bytes) | Required |
//! | `JWT_REFRESH_SECRET` | Refresh-token HMAC secret (≥ 32 bytes, ≠ `JWT_SECRET`) | Required |
//! | `JWT_ACCESS_TTL_SECS` | Access-token lifetime | `900` |
//! | `JWT_REFRESH_TTL_SECS` | Refresh-token / session lifetime | `604800` |
//! | `REFRESH_GRACE_PERIOD_SECS` | Window in which a rotated token is a benign retry | `30` |
//! | `REVOKED_RETENTION_SECS` | How long revoked sessions are kept | `2592000` |
//! | `SESSION_SWEEP_INTERVAL_SECS` | Period of the cleanup sweep | `86400` |
//! | `STRICT_SESSION_CHECK` | Require a live session on every access token | `true` |
//! | `PASSWORD_HASH_MEMORY_KIB` | Argon2id memory cost | `65536` |
//! | `PASSWORD_HASH_ITERATIONS` | Argon2id time cost | `3` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::path::PathBuf;

use chrono::Duration;

use crate::auth::PasswordCost;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
/// Directory for the embedded database file.
pub const DATA_DIR_ENV: &str = "DATA_DIR";
pub const APP_ENV_ENV: &str = "APP_ENV";
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";
pub const JWT_REFRESH_SECRET_ENV: &str = "JWT_REFRESH_SECRET";
pub const JWT_ACCESS_TTL_ENV: &str = "JWT_ACCESS_TTL_SECS";
pub const JWT_REFRESH_TTL_ENV: &str = "JWT_REFRESH_TTL_SECS";
pub const REFRESH_GRACE_ENV: &str = "REFRESH_GRACE_PERIOD_SECS";
pub const REVOKED_RETENTION_ENV: &str = "REVOKED_RETENTION_SECS";
pub const SWEEP_INTERVAL_ENV: &str = "SESSION_SWEEP_INTERVAL_SECS";
pub const STRICT_SESSION_CHECK_ENV: &str = "STRICT_SESSION_CHECK";
pub const PASSWORD_MEMORY_ENV: &str = "PASSWORD_HASH_MEMORY_KIB";
pub const PASSWORD_ITERATIONS_ENV: &str = "PASSWORD_HASH_ITERATIONS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3030;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_GRACE_SECS: i64 = 30;
pub const DEFAULT_RETENTION_SECS: i64 = 30 * 24 * 60 * 60;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 24 * 60 * 60;
/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Upper bound for every lifetime and retention setting (10 years).
pub const MAX_DURATION_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_BYTES: usize = 32;

/// Database file name under `DATA_DIR`.
const DATABASE_FILE: &str = "auth.redb";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error("{0} must be at least 32 bytes")]
    SecretTooShort(&'static str),

    #[error("JWT_SECRET and JWT_REFRESH_SECRET must differ")]
    SecretsNotDistinct,

    #[error("REVOKED_RETENTION_SECS must be at least REFRESH_GRACE_PERIOD_SECS")]
    RetentionShorterThanGrace,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// Immutable service configuration.
#[derive(Clone)]
pub struct AuthSettings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Secure cookies with `__Host-` names
    pub production: bool,
    pub jwt_secret: String,
    pub jwt_refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub refresh_grace: Duration,
    pub revoked_retention: Duration,
    pub sweep_interval: std::time::Duration,
    pub strict_session_check: bool,
    pub password_cost: PasswordCost,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("production", &self.production)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_refresh_secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("refresh_grace", &self.refresh_grace)
            .field("revoked_retention", &self.revoked_retention)
            .field("sweep_interval", &self.sweep_interval)
            .field("strict_session_check", &self.strict_session_check)
            .field("password_cost", &self.password_cost)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AuthSettings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let host = get(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = parse_or(get(PORT_ENV), PORT_ENV, DEFAULT_PORT)?;
        let data_dir = PathBuf::from(get(DATA_DIR_ENV).unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()));

        let production = match get(APP_ENV_ENV).as_deref() {
            None | Some("production") | Some("prod") => true,
            Some("development") | Some("dev") | Some("test") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: APP_ENV_ENV,
                    value: other.to_string(),
                    reason: "expected production or development",
                })
            }
        };

        let jwt_secret = required_secret(get(JWT_SECRET_ENV), JWT_SECRET_ENV)?;
        let jwt_refresh_secret = required_secret(get(JWT_REFRESH_SECRET_ENV), JWT_REFRESH_SECRET_ENV)?;
        if jwt_secret == jwt_refresh_secret {
            return Err(ConfigError::SecretsNotDistinct);
        }

        let access_secs = positive(get(JWT_ACCESS_TTL_ENV), JWT_ACCESS_TTL_ENV, DEFAULT_ACCESS_TTL_SECS)?;
        let refresh_secs = positive(get(JWT_REFRESH_TTL_ENV), JWT_REFRESH_TTL_ENV, DEFAULT_REFRESH_TTL_SECS)?;
        if refresh_secs <= access_secs {
            return Err(ConfigError::Invalid {
                name: JWT_REFRESH_TTL_ENV,
                value: refresh_secs.to_string(),
                reason: "must exceed the access-token lifetime",
            });
        }

        let grace_secs: i64 = parse_or(get(REFRESH_GRACE_ENV), REFRESH_GRACE_ENV, DEFAULT_GRACE_SECS)?;
        if !(0..=MAX_DURATION_SECS).contains(&grace_secs) {
            return Err(ConfigError::Invalid {
                name: REFRESH_GRACE_ENV,
                value: grace_secs.to_string(),
                reason: "must be between 0 and 10 years",
            });
        }
        let retention_secs = positive(get(REVOKED_RETENTION_ENV), REVOKED_RETENTION_ENV, DEFAULT_RETENTION_SECS)?;
        if retention_secs < grace_secs {
            return Err(ConfigError::RetentionShorterThanGrace);
        }

        let sweep_secs: u64 = parse_or(get(SWEEP_INTERVAL_ENV), SWEEP_INTERVAL_ENV, DEFAULT_SWEEP_INTERVAL_SECS)?;
        if sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                name: SWEEP_INTERVAL_ENV,
                value: "0".to_string(),
                reason: "must be positive",
            });
        }

        let strict_session_check = match get(STRICT_SESSION_CHECK_ENV) {
            None => true,
            Some(value) => parse_bool(&value).ok_or(ConfigError::Invalid {
                name: STRICT_SESSION_CHECK_ENV,
                value,
                reason: "expected true or false",
            })?,
        };

        let defaults = PasswordCost::default();
        let memory_kib: u32 = parse_or(get(PASSWORD_MEMORY_ENV), PASSWORD_MEMORY_ENV, defaults.memory_kib)?;
        if memory_kib < 8 * defaults.parallelism {
            return Err(ConfigError::Invalid {
                name: PASSWORD_MEMORY_ENV,
                value: memory_kib.to_string(),
                reason: "below the Argon2 minimum",
            });
        }
        let iterations: u32 = parse_or(get(PASSWORD_ITERATIONS_ENV), PASSWORD_ITERATIONS_ENV, defaults.iterations)?;
        if iterations == 0 {
            return Err(ConfigError::Invalid {
                name: PASSWORD_ITERATIONS_ENV,
                value: "0".to_string(),
                reason: "must be positive",
            });
        }

        let log_format = match get(LOG_FORMAT_ENV).as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other.to_string(),
                    reason: "expected json or pretty",
                })
            }
        };

        Ok(Self {
            host,
            port,
            data_dir,
            production,
            jwt_secret,
            jwt_refresh_secret,
            access_ttl: duration(access_secs, JWT_ACCESS_TTL_ENV)?,
            refresh_ttl: duration(refresh_secs, JWT_REFRESH_TTL_ENV)?,
            refresh_grace: duration(grace_secs, REFRESH_GRACE_ENV)?,
            revoked_retention: duration(retention_secs, REVOKED_RETENTION_ENV)?,
            sweep_interval: std::time::Duration::from_secs(sweep_secs),
            strict_session_check,
            password_cost: PasswordCost {
                memory_kib,
                iterations,
                parallelism: defaults.parallelism,
            },
            log_format,
        })
    }

    /// `host:port` for the listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
            name,
            value: raw,
            reason: "not a valid number",
        }),
    }
}

/// Seconds in `1..=MAX_DURATION_SECS`.
fn positive(value: Option<String>, name: &'static str, default: i64) -> Result<i64, ConfigError> {
    let parsed = parse_or(value, name, default)?;
    if parsed <= 0 {
        return Err(ConfigError::Invalid {
            name,
            value: parsed.to_string(),
            reason: "must be positive",
        });
    }
    if parsed > MAX_DURATION_SECS {
        return Err(ConfigError::Invalid {
            name,
            value: parsed.to_string(),
            reason: "must not exceed 10 years",
        });
    }
    Ok(parsed)
}

fn duration(secs: i64, name: &'static str) -> Result<Duration, ConfigError> {
    Duration::try_seconds(secs).ok_or(ConfigError::Invalid {
        name,
        value: secs.to_string(),
        reason: "out of range",
    })
}

fn required_secret(value: Option<String>, name: &'static str) -> Result<String, ConfigError> {
    let secret = value.ok_or(ConfigError::Missing(name))?;
    if secret.len() < MIN_SECRET_BYTES {
        return Err(ConfigError::SecretTooShort(name));
    }
    Ok(secret)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ACCESS: &str = "access-secret-access-secret-access-secret";
    const REFRESH: &str = "refresh-secret-refresh-secret-refresh-secret";

    fn load(vars: &[(&str, &str)]) -> Result<AuthSettings, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthSettings::from_lookup(|name| map.get(name).cloned())
    }

    fn with_secrets(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut vars = vec![(JWT_SECRET_ENV, ACCESS), (JWT_REFRESH_SECRET_ENV, REFRESH)];
        vars.extend_from_slice(extra);
        vars
    }

    #[test]
    fn defaults_apply_when_only_secrets_set() {
        let settings = load(&with_secrets(&[])).unwrap();
        assert_eq!(settings.bind_address(), "0.0.0.0:3030");
        assert_eq!(settings.database_path(), PathBuf::from("./data").join("auth.redb"));
        assert!(settings.production);
        assert_eq!(settings.access_ttl, Duration::minutes(15));
        assert_eq!(settings.refresh_ttl, Duration::days(7));
        assert_eq!(settings.refresh_grace, Duration::seconds(30));
        assert_eq!(settings.revoked_retention, Duration::days(30));
        assert_eq!(settings.sweep_interval, std::time::Duration::from_secs(86400));
        assert!(settings.strict_session_check);
        assert_eq!(settings.password_cost, PasswordCost::default());
        assert_eq!(settings.log_format, LogFormat::Pretty);
    }

    #[test]
    fn secrets_are_required_long_and_distinct() {
        assert_eq!(load(&[]).unwrap_err(), ConfigError::Missing(JWT_SECRET_ENV));
        assert_eq!(
            load(&[(JWT_SECRET_ENV, ACCESS)]).unwrap_err(),
            ConfigError::Missing(JWT_REFRESH_SECRET_ENV)
        );
        assert_eq!(
            load(&[(JWT_SECRET_ENV, "short"), (JWT_REFRESH_SECRET_ENV, REFRESH)]).unwrap_err(),
            ConfigError::SecretTooShort(JWT_SECRET_ENV)
        );
        assert_eq!(
            load(&[(JWT_SECRET_ENV, ACCESS), (JWT_REFRESH_SECRET_ENV, ACCESS)]).unwrap_err(),
            ConfigError::SecretsNotDistinct
        );
    }

    #[test]
    fn retention_must_cover_grace() {
        let err = load(&with_secrets(&[
            (REFRESH_GRACE_ENV, "120"),
            (REVOKED_RETENTION_ENV, "60"),
        ]))
        .unwrap_err();
        assert_eq!(err, ConfigError::RetentionShorterThanGrace);
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = load(&with_secrets(&[
            (HOST_ENV, "127.0.0.1"),
            (PORT_ENV, "8081"),
            (APP_ENV_ENV, "development"),
            (STRICT_SESSION_CHECK_ENV, "false"),
            (LOG_FORMAT_ENV, "json"),
            (PASSWORD_MEMORY_ENV, "19456"),
            (PASSWORD_ITERATIONS_ENV, "2"),
            (SWEEP_INTERVAL_ENV, "3600"),
        ]))
        .unwrap();
        assert_eq!(settings.bind_address(), "127.0.0.1:8081");
        assert!(!settings.production);
        assert!(!settings.strict_session_check);
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.password_cost.memory_kib, 19456);
        assert_eq!(settings.password_cost.iterations, 2);
        assert_eq!(settings.sweep_interval, std::time::Duration::from_secs(3600));
    }

    #[test]
    fn invalid_values_rejected() {
        for (name, value) in [
            (PORT_ENV, "http"),
            (APP_ENV_ENV, "staging"),
            (STRICT_SESSION_CHECK_ENV, "maybe"),
            (JWT_ACCESS_TTL_ENV, "0"),
            (JWT_REFRESH_TTL_ENV, "60"),
            (SWEEP_INTERVAL_ENV, "0"),
            (PASSWORD_ITERATIONS_ENV, "0"),
            (LOG_FORMAT_ENV, "xml"),
            (JWT_REFRESH_TTL_ENV, "100000000000000"),
            (JWT_REFRESH_TTL_ENV, "9223372036854775807"),
            (REVOKED_RETENTION_ENV, "315360001"),
            (REFRESH_GRACE_ENV, "-1"),
            (REFRESH_GRACE_ENV, "315360001"),
        ] {
            let result = load(&with_secrets(&[(name, value)]));
            assert!(
                matches!(result, Err(ConfigError::Invalid { .. })),
                "{name}={value} should be rejected"
            );
        }
    }

    #[test]
    fn longest_accepted_lifetime_does_not_overflow() {
        let max = MAX_DURATION_SECS.to_string();
        let settings = load(&[
            (JWT_SECRET_ENV, ACCESS),
            (JWT_REFRESH_SECRET_ENV, REFRESH),
            (JWT_REFRESH_TTL_ENV, max.as_str()),
            (REVOKED_RETENTION_ENV, max.as_str()),
        ])
        .unwrap();

        // Session expiry arithmetic must not overflow at the bound
        let now = chrono::Utc::now();
        assert!(now.checked_add_signed(settings.refresh_ttl).is_some());
        assert!(now.checked_sub_signed(settings.revoked_retention).is_some());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let settings = load(&with_secrets(&[])).unwrap();
        let printed = format!("{settings:?}");
        assert!(!printed.contains(ACCESS));
        assert!(!printed.contains(REFRESH));
    }
}

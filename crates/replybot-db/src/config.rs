use replybot_core::AppError;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection settings for the post store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    /// Read `DATABASE_URL` (required) and `DATABASE_MAX_CONNECTIONS`
    /// (optional, default 5).
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_values(
            std::env::var("DATABASE_URL").ok(),
            std::env::var("DATABASE_MAX_CONNECTIONS").ok(),
        )
    }

    fn from_values(url: Option<String>, max_connections: Option<String>) -> Result<Self, AppError> {
        let url = url.filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            AppError::ConfigError("DATABASE_URL not set. Required for the postgres sink.".into())
        })?;

        let max_connections = match max_connections {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(0) => {
                    return Err(AppError::ConfigError(
                        "DATABASE_MAX_CONNECTIONS must be at least 1".into(),
                    ));
                }
                Ok(n) => n,
                Err(_) => {
                    return Err(AppError::ConfigError(format!(
                        "Invalid DATABASE_MAX_CONNECTIONS '{raw}': must be a positive integer"
                    )));
                }
            },
        };

        Ok(Self {
            url,
            max_connections,
        })
    }
}

//! Error types for the publishing engine

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyndicateError>;

#[derive(Error, Debug)]
pub enum SyndicateError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl SyndicateError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SyndicateError::Validation(_) => 3,
            SyndicateError::NotFound(_) => 3,
            SyndicateError::Conflict(_) => 1,
            SyndicateError::UnsupportedPlatform(_) => 2,
            SyndicateError::Config(_) => 2,
            SyndicateError::Database(_) => 2,
            SyndicateError::Publish(_) => 1,
            SyndicateError::Scheduler(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures from the single external publish call.
///
/// These are caught per target by the orchestrator and recorded on the
/// target; they never abort sibling targets.
#[derive(Error, Debug, Clone)]
pub enum PublishError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Payload rejected: {0}")]
    Payload(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_validation() {
        let error = SyndicateError::Validation("empty target list".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_conflict() {
        let error = SyndicateError::Conflict("post already published".to_string());
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_unsupported_platform() {
        let error = SyndicateError::UnsupportedPlatform("myspace".to_string());
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_config_error() {
        let error = SyndicateError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_publish_error() {
        let error = SyndicateError::Publish(PublishError::Network("connection reset".to_string()));
        assert_eq!(error.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting_validation() {
        let error = SyndicateError::Validation("target list cannot be empty".to_string());
        assert_eq!(
            format!("{}", error),
            "Validation failed: target list cannot be empty"
        );
    }

    #[test]
    fn test_error_message_formatting_conflict() {
        let error = SyndicateError::Conflict("cannot edit a published post".to_string());
        assert_eq!(format!("{}", error), "Conflict: cannot edit a published post");
    }

    #[test]
    fn test_publish_error_variants() {
        let auth = PublishError::Auth("token expired".to_string());
        assert_eq!(format!("{}", auth), "Authentication failed: token expired");

        let payload = PublishError::Payload("caption too long".to_string());
        assert_eq!(format!("{}", payload), "Payload rejected: caption too long");

        let network = PublishError::Network("dns failure".to_string());
        assert_eq!(format!("{}", network), "Network error: dns failure");

        let timeout = PublishError::Timeout(30);
        assert_eq!(format!("{}", timeout), "Timed out after 30s");
    }

    #[test]
    fn test_publish_error_clone() {
        let original = PublishError::Network("connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }

    #[test]
    fn test_error_conversion_from_publish_error() {
        let publish_error = PublishError::Payload("bad media type".to_string());
        let error: SyndicateError = publish_error.into();
        assert!(matches!(error, SyndicateError::Publish(_)));
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ));
        let error: SyndicateError = db_error.into();
        assert!(matches!(error, SyndicateError::Database(_)));
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_err() -> Result<()> {
            Err(SyndicateError::NotFound("post abc".to_string()))
        }
        assert!(returns_err().is_err());
    }
}

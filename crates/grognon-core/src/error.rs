use thiserror::Error;

#[derive(Debug, Error)]
pub enum GrognonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An external source is unreachable, closed, or too slow.
    #[error("Source unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GrognonError {
    /// Short error code string surfaced to presentation layers.
    pub fn code(&self) -> &'static str {
        match self {
            GrognonError::Config(_) => "CONFIG_ERROR",
            GrognonError::NotFound { .. } => "NOT_FOUND",
            GrognonError::InvalidInput(_) => "INVALID_INPUT",
            GrognonError::Unavailable(_) => "SOURCE_UNAVAILABLE",
            GrognonError::Database(_) => "DATABASE_ERROR",
            GrognonError::Io(_) => "IO_ERROR",
            GrognonError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, GrognonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(GrognonError::Config("x".into()).code(), "CONFIG_ERROR");
        assert_eq!(
            GrognonError::NotFound {
                what: "cron 3".into()
            }
            .code(),
            "NOT_FOUND"
        );
        assert_eq!(GrognonError::Internal("x".into()).code(), "INTERNAL_ERROR");
    }

    #[test]
    fn not_found_message_names_the_subject() {
        let err = GrognonError::NotFound {
            what: "connection 7".into(),
        };
        assert_eq!(err.to_string(), "Not found: connection 7");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Geolocation error: {0}")]
    Geo(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Ingest queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_query() {
        let err = Error::InvalidQuery("days must be between 1 and 365".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid query: days must be between 1 and 365"
        );
    }

    #[test]
    fn test_error_display_unauthorized() {
        assert_eq!(Error::Unauthorized.to_string(), "Unauthorized");
    }

    #[test]
    fn test_error_display_geo() {
        let err = Error::Geo("lookup status fail".to_string());
        assert_eq!(err.to_string(), "Geolocation error: lookup status fail");
    }

    #[test]
    fn test_error_display_queue_closed() {
        assert_eq!(Error::QueueClosed.to_string(), "Ingest queue closed");
    }

    #[test]
    fn test_error_from_sqlx_error() {
        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::Database(_)));
    }
}

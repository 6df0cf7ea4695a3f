use sales_core::SourceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("Authentication failed")]
    AuthError,
}

impl From<MarketplaceError> for SourceError {
    fn from(err: MarketplaceError) -> Self {
        match err {
            MarketplaceError::HttpError(e) => SourceError::Transport(e.to_string()),
            MarketplaceError::ParseError { message } => SourceError::Parse(message),
            MarketplaceError::ApiError { status, message } => SourceError::Api { status, message },
            MarketplaceError::RateLimit => SourceError::RateLimit,
            MarketplaceError::AuthError => SourceError::Api {
                status: 401,
                message: "Authentication failed".to_string(),
            },
        }
    }
}

use thiserror::Error;

pub type SmResult<T> = Result<T, SmError>;

#[derive(Debug, Error)]
pub enum SmError {
    /// Bad or missing startup configuration (master key, config file).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed request shape.
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Trapdoor verification failed. Carries no detail on purpose.
    #[error("not authorized")]
    Authorization,

    /// AEAD tag mismatch or malformed ciphertext.
    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SmError {
    /// Opaque message safe to hand to a caller.
    ///
    /// Never includes the inner detail string: that stays in the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            SmError::Configuration(_) => "service misconfigured",
            SmError::Validation(_) => "invalid request",
            SmError::NotFound(_) => "not found",
            SmError::Authorization => "not authorized",
            SmError::Integrity(_) => "stored data failed integrity check",
            SmError::Storage(_)
            | SmError::Serialization(_)
            | SmError::Crypto(_)
            | SmError::Io(_)
            | SmError::Other(_) => "internal error",
        }
    }

    /// HTTP-equivalent status class for a request boundary.
    pub fn status_code(&self) -> u16 {
        match self {
            SmError::Validation(_) => 400,
            SmError::Authorization => 403,
            SmError::NotFound(_) => 404,
            SmError::Integrity(_) => 409,
            SmError::Configuration(_)
            | SmError::Storage(_)
            | SmError::Serialization(_)
            | SmError::Crypto(_)
            | SmError::Io(_)
            | SmError::Other(_) => 500,
        }
    }
}

impl From<serde_json::Error> for SmError {
    fn from(e: serde_json::Error) -> Self {
        SmError::Serialization(e.to_string())
    }
}

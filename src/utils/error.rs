use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("Password hashing error: {0}")]
    PasswordError(#[from] bcrypt::BcryptError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Storage error: {message}")]
    StorageError { message: String },

    #[error("Malformed request: {message}")]
    RequestError { message: String },

    #[error("body of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("no action given")]
    MissingAction,

    #[error("invalid action: {name}")]
    UnknownAction { name: String },

    #[error("{message}")]
    InvalidParameter { message: String },

    #[error("{message}")]
    Unauthorized { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Request,
    Action,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl DispatchError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::StorageError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigError { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. } => ErrorCategory::Configuration,
            Self::IoError(_)
            | Self::DatabaseError(_)
            | Self::StorageError { .. } => ErrorCategory::Storage,
            Self::RequestError { .. } | Self::PayloadTooLarge { .. } => ErrorCategory::Request,
            Self::MissingAction
            | Self::UnknownAction { .. }
            | Self::InvalidParameter { .. }
            | Self::Unauthorized { .. } => ErrorCategory::Action,
            Self::PasswordError(_) => ErrorCategory::Internal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::Action => ErrorSeverity::Low,
            ErrorCategory::Request => ErrorSeverity::Medium,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::Storage | ErrorCategory::Internal => ErrorSeverity::Critical,
        }
    }

    /// Errors caused by the caller; their message is safe to send back.
    pub fn is_client_error(&self) -> bool {
        self.category() == ErrorCategory::Action
    }

    /// HTTP status for an error that ends the whole request.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::PayloadTooLarge { .. } => 413,
            _ if self.category() == ErrorCategory::Request => 400,
            _ => 500,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Action => self.to_string(),
            ErrorCategory::Request => format!("The request could not be read: {}", self),
            ErrorCategory::Configuration => format!("The service is misconfigured: {}", self),
            ErrorCategory::Storage => "The service could not access its data.".to_string(),
            ErrorCategory::Internal => "The service hit an internal error.".to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Action => "Check the action name and its parameters",
            ErrorCategory::Request => "Send a url-encoded request within the size limit",
            ErrorCategory::Configuration => "Fix the configuration file and retry",
            ErrorCategory::Storage => "Check that storage.data_dir exists and is writable",
            ErrorCategory::Internal => "Inspect the service logs",
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;

// Error handling framework

use crate::models::UserId;
use thiserror::Error;

/// Saved-search parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SearchSpecError {
    #[error("Invalid number for '{key}': {value}")]
    InvalidNumber { key: String, value: String },

    #[error("Invalid boolean for '{key}': {value}")]
    InvalidBool { key: String, value: String },

    #[error("Unknown search option: {0}")]
    UnknownKey(String),
}

/// Database-specific errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Database health check failed: {0}")]
    HealthCheckFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),
}

/// User store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Saved search '{signature}' not found for user {user_id}")]
    SearchNotFound { user_id: UserId, signature: String },

    #[error("Refusing to store user with id 0")]
    InvalidUserId,

    #[error("Invalid user record: {0}")]
    InvalidRecord(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Filesystem error: {0}")]
    FileSystem(String),

    #[error("Scan aborted: {0}")]
    ScanAborted(String),
}

/// Search provider errors. All of them are transient from the scheduler's point of view.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server responded with {status} to {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to decode search response: {0}")]
    Decode(String),

    #[error("Invalid search URL: {0}")]
    InvalidUrl(String),
}

/// Queue-related errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue closed")]
    Closed,
}

/// Notification delivery errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("Messaging API responded with {status}: {body}")]
    HttpStatus { status: u16, body: String },
}

/// Outcome errors of the notification dispatcher. Every variant drops the notification.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Saved search '{signature}' was deleted for user {user_id}")]
    SearchDeleted { user_id: UserId, signature: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),
}

/// Worker job errors
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Search provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification queue error: {0}")]
    Queue(#[from] QueueError),
}

impl ProviderError {
    /// Short label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Request(_) => "request",
            ProviderError::Timeout(_) => "timeout",
            ProviderError::HttpStatus { .. } => "http_status",
            ProviderError::Decode(_) => "decode",
            ProviderError::InvalidUrl(_) => "invalid_url",
        }
    }
}

impl DispatchError {
    /// Short label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::SearchDeleted { .. } => "search_deleted",
            DispatchError::Store(_) => "store",
            DispatchError::Notify(_) => "delivery",
        }
    }
}

impl WorkerError {
    /// Short label used as a metrics dimension
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::Provider(e) => e.kind(),
            WorkerError::Store(_) => "store",
            WorkerError::Queue(_) => "queue",
        }
    }
}

// Implement From for common external errors
impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound("Record not found".to_string()),
            sqlx::Error::Database(db_err) => DatabaseError::QueryFailed(db_err.message().to_string()),
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(DatabaseError::from(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidRecord(err.to_string())
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        NotifyError::DeliveryFailed(err.to_string())
    }
}

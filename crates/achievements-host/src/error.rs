//! Error types for the reference host.
//!
//! [`HostError`] wraps every failure the host can hit while loading
//! content, driving the service, and reading or writing snapshot files.

use achievements_core::{
    AchievementError, ConfigError, FactoryError, GroupError, HandlerError, ServiceError,
};

/// Top-level error for the host binary.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Host settings are invalid.
    #[error("settings error: {0}")]
    Settings(String),

    /// The achievement catalog could not be loaded.
    #[error("catalog error: {source}")]
    Catalog {
        /// The underlying catalog error.
        #[from]
        source: ConfigError,
    },

    /// A capability could not be registered.
    #[error("factory error: {source}")]
    Factory {
        /// The underlying factory error.
        #[from]
        source: FactoryError,
    },

    /// The achievements service rejected an operation.
    #[error("service error: {source}")]
    Service {
        /// The underlying service error.
        #[from]
        source: ServiceError,
    },

    /// A group could not be built or refreshed.
    #[error("group error: {source}")]
    Group {
        /// The underlying group error.
        #[from]
        source: GroupError,
    },

    /// A handler rejected a progress update.
    #[error("handler error: {source}")]
    Handler {
        /// The underlying handler error.
        #[from]
        source: HandlerError,
    },

    /// An achievement rejected an operation.
    #[error("achievement error: {source}")]
    Achievement {
        /// The underlying achievement error.
        #[from]
        source: AchievementError,
    },

    /// Reading or writing a snapshot file failed.
    #[error("snapshot I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// A snapshot file is not valid JSON.
    #[error("snapshot format error: {source}")]
    Snapshot {
        /// The underlying JSON error.
        #[from]
        source: serde_json::Error,
    },

    /// A console command could not be understood.
    #[error("invalid command: {0}")]
    Command(String),
}

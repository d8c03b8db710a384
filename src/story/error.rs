use thiserror::Error;

/// Errors from the story service: login, feed and media fetching.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("Login rejected for {username}: {reason}")]
    BadCredentials { username: String, reason: String },

    /// The service wants an interactive challenge this tool cannot answer.
    #[error("Account checkpoint required: {0}")]
    CheckpointRequired(String),

    #[error("Session expired or logged out")]
    SessionExpired,

    #[error("No such account: {0}")]
    UnknownAccount(String),

    /// A story item with neither a video nor an image variant.
    #[error("Story item {item_id} carries no media")]
    MissingMedia { item_id: String },

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StoryError {
    /// True when the failure means our credentials or session are no good,
    /// as opposed to a transient or server-side problem.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            StoryError::BadCredentials { .. }
                | StoryError::CheckpointRequired(_)
                | StoryError::SessionExpired
        )
    }
}

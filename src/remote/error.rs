use thiserror::Error;

/// Errors from the remote storage service.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote login rejected: {0}")]
    LoginRejected(String),

    #[error("Not logged in to the remote service")]
    NotLoggedIn,

    #[error("Remote API error {code}: {message}")]
    Api { code: u32, message: String },

    /// A folder that was just created could not be found again.
    #[error("Folder {0:?} disappeared between creation and lookup")]
    FolderVanished(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// True when the failure means the remote credentials or auth token
    /// are no good.
    pub fn is_authentication(&self) -> bool {
        match self {
            RemoteError::LoginRejected(_) | RemoteError::NotLoggedIn => true,
            // 1000: log in required, 2000: bad credentials, 2094: token
            // revoked or expired.
            RemoteError::Api { code, .. } => matches!(code, 1000 | 2000 | 2094),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_classification() {
        assert!(RemoteError::LoginRejected("wrong password".to_string()).is_authentication());
        assert!(RemoteError::NotLoggedIn.is_authentication());
        for code in [1000, 2000, 2094] {
            let e = RemoteError::Api {
                code,
                message: String::new(),
            };
            assert!(e.is_authentication(), "code {code}");
        }

        let e = RemoteError::Api {
            code: 2005,
            message: "not found".to_string(),
        };
        assert!(!e.is_authentication());
        assert!(!RemoteError::FolderVanished("alice".to_string()).is_authentication());
        assert!(!RemoteError::Io(std::io::Error::other("disk full")).is_authentication());
    }

    #[test]
    fn test_display_messages() {
        let e = RemoteError::Api {
            code: 2008,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(e.to_string(), "Remote API error 2008: quota exceeded");
        assert_eq!(
            RemoteError::FolderVanished("alice".to_string()).to_string(),
            "Folder \"alice\" disappeared between creation and lookup"
        );
    }
}

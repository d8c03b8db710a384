//! On-disk session cache.
//!
//! Login state is cached in a JSON file between runs so that most
//! invocations skip the login call entirely. The file stores the random
//! device seed (so the service keeps seeing the same "device"), the logged
//! in user id and the response cookies. Binary fields use a tagged
//! `{"__class__": "bytes", "__value__": <base64>}` wrapper, which is what
//! earlier deployments of this tool wrote; old cache files keep working.

use std::io;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use cookie::Cookie;
use serde::{Deserialize, Serialize};

/// Default session cache filename, in the working directory.
pub const SESSION_FILE: &str = "settings.txt";

/// One cookie plus the URL it was set by.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieEntry {
    pub url: String,
    pub cookie: String,
}

/// Everything needed to resume a login without re-sending credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    /// Random per-install seed all device identifiers derive from.
    #[serde(with = "tagged_bytes")]
    pub device_seed: Vec<u8>,
    #[serde(default)]
    pub user_id: Option<u64>,
    #[serde(default)]
    pub cookies: Vec<CookieEntry>,
}

impl SessionState {
    /// A brand-new session with a freshly rolled device seed.
    pub fn fresh() -> Self {
        Self {
            device_seed: uuid::Uuid::new_v4().into_bytes().to_vec(),
            user_id: None,
            cookies: Vec::new(),
        }
    }
}

mod tagged_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Tagged {
        #[serde(rename = "__class__")]
        class: String,
        #[serde(rename = "__value__")]
        value: String,
    }

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        Tagged {
            class: "bytes".to_string(),
            value: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let tagged = Tagged::deserialize(deserializer)?;
        if tagged.class != "bytes" {
            return Err(D::Error::custom(format!(
                "expected __class__ \"bytes\", found {:?}",
                tagged.class
            )));
        }
        // Tolerate stray whitespace from hand-edited cache files.
        let compact: String = tagged.value.split_whitespace().collect();
        STANDARD.decode(compact).map_err(D::Error::custom)
    }
}

/// Loads and saves [`SessionState`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read the cached session. A missing file is a normal first run;
    /// unreadable or corrupt files are logged and treated the same way.
    pub fn load(&self) -> Option<SessionState> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!("Cannot read session cache {}: {}", self.path.display(), e);
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => Some(state),
            Err(_) => {
                tracing::warn!(
                    "Session cache {} is corrupt, starting fresh",
                    self.path.display()
                );
                None
            }
        }
    }

    pub fn save(&self, state: &SessionState) -> io::Result<()> {
        let json = serde_json::to_string_pretty(state).map_err(io::Error::other)?;
        std::fs::write(&self.path, json)?;
        // The file holds login cookies; keep it owner-only.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::debug!("Saved session cache to {}", self.path.display());
        Ok(())
    }
}

/// True when `cookie_str` carries an `Expires` attribute in the past.
/// Session cookies without one never count as expired here.
pub(crate) fn is_cookie_expired(cookie_str: &str, now: DateTime<Utc>) -> bool {
    if let Ok(parsed) = Cookie::parse(cookie_str) {
        if let Some(expires) = parsed.expires_datetime() {
            let expires_system: SystemTime = expires.into();
            let expires_chrono: DateTime<Utc> = expires_system.into();
            return expires_chrono <= now;
        }
    }
    false
}

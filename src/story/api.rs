//! Mobile-API client for the story service.
//!
//! Speaks the private JSON API the official Android app uses: a pinned
//! app user agent, form-encoded `signed_body` login and per-user story
//! reels. Device identifiers are derived deterministically from the
//! session's random seed so the service sees one stable "device" per
//! install instead of a new one per run.

use std::sync::Arc;

use chrono::Utc;
use reqwest::header::{ACCEPT_LANGUAGE, HeaderMap, HeaderValue, SET_COOKIE, USER_AGENT};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::story::StoryItem;
use crate::story::error::StoryError;
use crate::story::session::{CookieEntry, SessionState, is_cookie_expired};

const API_BASE: &str = "https://i.instagram.com/api/v1";
const MOBILE_USER_AGENT: &str = "Instagram 289.0.0.77.109 Android (33/13; 420dpi; 1080x2219; \
     Google; Pixel 7; panther; armv8l; en_US; 314665256)";
const APP_ID: &str = "567067343352427";

/// Authenticated client for one story-service account.
pub struct StoryApiClient {
    client: reqwest::Client,
    username: String,
    password: String,
    state: SessionState,
}

impl StoryApiClient {
    /// Build a client around `state`. Unexpired cached cookies are loaded
    /// into the jar, so a resumed session authenticates without logging in.
    pub fn new(username: &str, password: &str, state: SessionState) -> Result<Self, StoryError> {
        let cookie_jar = Arc::new(reqwest::cookie::Jar::default());
        let now = Utc::now();
        for entry in &state.cookies {
            if is_cookie_expired(&entry.cookie, now) {
                tracing::debug!("Pruning expired cookie from {}", entry.url);
                continue;
            }
            if let Ok(url) = entry.url.parse::<url::Url>() {
                cookie_jar.add_cookie_str(&entry.cookie, &url);
            }
        }

        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, HeaderValue::from_static(MOBILE_USER_AGENT));
        default_headers.insert("X-IG-App-ID", HeaderValue::from_static(APP_ID));
        default_headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US"));

        let client = reqwest::Client::builder()
            .cookie_provider(cookie_jar)
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            username: username.to_string(),
            password: password.to_string(),
            state,
        })
    }

    /// Log in with the stored credentials. On success the logged-in user id
    /// is recorded in the session state and returned.
    pub async fn login(&mut self) -> Result<u64, StoryError> {
        let seed = self.state.device_seed.clone();
        let payload = json!({
            "username": self.username,
            "enc_password": enc_password(&self.password, Utc::now().timestamp()),
            "guid": derived_uuid(&seed, "guid"),
            "phone_id": derived_uuid(&seed, "phone_id"),
            "device_id": derived_device_id(&seed),
            "login_attempt_count": "0",
        });
        let response = self
            .client
            .post(format!("{API_BASE}/accounts/login/"))
            .form(&[("signed_body", format!("SIGNATURE.{payload}"))])
            .send()
            .await?;
        self.capture_cookies(&response);
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_login_failure(
                &self.username,
                status.as_u16(),
                &body,
            ));
        }
        let parsed: LoginResponse = serde_json::from_str(&body)?;
        match parsed.logged_in_user {
            Some(user) => {
                self.state.user_id = Some(user.pk);
                tracing::info!("Logged in as {}", self.username);
                Ok(user.pk)
            }
            None => Err(StoryError::Api {
                status: status.as_u16(),
                message: "login response carried no user".to_string(),
            }),
        }
    }

    /// Probe whether the cached cookies still authenticate. `Ok(false)`
    /// means the session was rejected and a fresh login is needed.
    pub async fn verify_session(&mut self) -> Result<bool, StoryError> {
        let response = self
            .client
            .get(format!("{API_BASE}/accounts/current_user/?edit=true"))
            .send()
            .await?;
        self.capture_cookies(&response);
        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        let body = response.text().await?;
        let err = classify_api_failure(status.as_u16(), &body);
        if err.is_authentication() {
            Ok(false)
        } else {
            Err(err)
        }
    }

    /// Resolve an account name to its numeric user id.
    pub async fn fetch_user_id(&mut self, account: &str) -> Result<u64, StoryError> {
        let url = format!("{API_BASE}/users/{account}/usernameinfo/");
        match self.get_json::<UserInfoResponse>(&url).await {
            Ok(parsed) => Ok(parsed.user.pk),
            Err(StoryError::Api { status: 404, .. }) => {
                Err(StoryError::UnknownAccount(account.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch the active story reel for a user id. An account with no
    /// current stories yields an empty list.
    pub async fn fetch_reel(&mut self, user_id: u64) -> Result<Vec<ReelItem>, StoryError> {
        let url = format!("{API_BASE}/feed/user/{user_id}/story/");
        let parsed: StoryFeedResponse = self.get_json(&url).await?;
        Ok(parsed.reel.map(|reel| reel.items).unwrap_or_default())
    }

    /// Resolve `account` and return its current stories, oldest first as
    /// the service sends them.
    pub async fn fetch_stories(&mut self, account: &str) -> Result<Vec<StoryItem>, StoryError> {
        let user_id = self.fetch_user_id(account).await?;
        let items = self.fetch_reel(user_id).await?;
        let mut stories = Vec::with_capacity(items.len());
        for item in items {
            stories.push(story_item_from_reel(item)?);
        }
        Ok(stories)
    }

    /// Download one media URL to memory. Story media tops out around a few
    /// tens of megabytes, so buffering whole files is fine.
    pub async fn download_media(&self, url: &str) -> Result<Vec<u8>, StoryError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&mut self, url: &str) -> Result<T, StoryError> {
        let response = self.client.get(url).send().await?;
        self.capture_cookies(&response);
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_api_failure(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&body)?)
    }

    /// Mirror `Set-Cookie` response headers into the session state.
    /// `reqwest::cookie::Jar` does not expose iteration, so the persistable
    /// copy is kept by hand.
    fn capture_cookies(&mut self, response: &reqwest::Response) {
        let url = response.url().to_string();
        let now = Utc::now();
        for header in response.headers().get_all(SET_COOKIE) {
            if let Ok(value) = header.to_str() {
                if is_cookie_expired(value, now) {
                    continue;
                }
                upsert_cookie(&mut self.state.cookies, &url, value);
            }
        }
    }
}

/// Replace any entry with the same cookie name and URL, then append the
/// new value.
fn upsert_cookie(entries: &mut Vec<CookieEntry>, url: &str, value: &str) {
    let name = value.split('=').next().unwrap_or("");
    if name.is_empty() {
        return;
    }
    entries.retain(|entry| {
        if entry.url == url {
            let existing = entry.cookie.split('=').next().unwrap_or("");
            return existing != name;
        }
        true
    });
    entries.push(CookieEntry {
        url: url.to_string(),
        cookie: value.to_string(),
    });
}

/// The plaintext password envelope the mobile app sends when device
/// keys are unavailable.
fn enc_password(password: &str, timestamp: i64) -> String {
    format!("#PWD_INSTAGRAM:0:{timestamp}:{password}")
}

/// A UUID derived from the device seed and a label, stable across runs.
fn derived_uuid(seed: &[u8], label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(label.as_bytes());
    let digest = hasher.finalize();
    let bytes: [u8; 16] = digest[..16].try_into().expect("SHA-256 digest is 32 bytes");
    Uuid::from_bytes(bytes).to_string()
}

/// The `android-<16 hex digits>` device id, derived like the UUIDs.
fn derived_device_id(seed: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(b"device_id");
    let digest = hasher.finalize();
    let hex: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    format!("android-{hex}")
}

#[derive(Debug, Default, Deserialize)]
struct Failure {
    message: Option<String>,
    error_type: Option<String>,
}

impl Failure {
    /// Extract `(message, error_type)` from an error body, tolerating
    /// non-JSON responses.
    fn parse(body: &str) -> (String, String) {
        let failure: Failure = serde_json::from_str(body).unwrap_or_default();
        (
            failure.message.unwrap_or_default(),
            failure.error_type.unwrap_or_default(),
        )
    }
}

fn classify_api_failure(status: u16, body: &str) -> StoryError {
    let (message, error_type) = Failure::parse(body);
    let detail = if message.is_empty() {
        error_type.clone()
    } else {
        message.clone()
    };
    if message == "login_required" || error_type == "login_required" {
        return StoryError::SessionExpired;
    }
    if matches!(
        error_type.as_str(),
        "challenge_required" | "checkpoint_challenge_required"
    ) || message == "challenge_required"
    {
        return StoryError::CheckpointRequired(detail);
    }
    StoryError::Api {
        status,
        message: if detail.is_empty() {
            "unknown error".to_string()
        } else {
            detail
        },
    }
}

fn classify_login_failure(username: &str, status: u16, body: &str) -> StoryError {
    let (message, error_type) = Failure::parse(body);
    let detail = if message.is_empty() {
        error_type.clone()
    } else {
        message.clone()
    };
    if matches!(error_type.as_str(), "bad_password" | "invalid_user") {
        return StoryError::BadCredentials {
            username: username.to_string(),
            reason: detail,
        };
    }
    if matches!(
        error_type.as_str(),
        "challenge_required" | "checkpoint_challenge_required"
    ) {
        return StoryError::CheckpointRequired(detail);
    }
    StoryError::Api {
        status,
        message: if detail.is_empty() {
            "unknown error".to_string()
        } else {
            detail
        },
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    logged_in_user: Option<LoggedInUser>,
}

#[derive(Debug, Deserialize)]
struct LoggedInUser {
    pk: u64,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    user: UserInfo,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    pk: u64,
}

#[derive(Debug, Deserialize)]
struct StoryFeedResponse {
    reel: Option<Reel>,
}

#[derive(Debug, Deserialize)]
struct Reel {
    #[serde(default)]
    items: Vec<ReelItem>,
}

/// One raw story item as the feed endpoint returns it.
#[derive(Debug, Deserialize)]
pub struct ReelItem {
    #[serde(default)]
    id: String,
    taken_at: i64,
    #[serde(default)]
    video_versions: Vec<MediaVersion>,
    image_versions2: Option<ImageVersions>,
}

#[derive(Debug, Deserialize)]
struct MediaVersion {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<MediaVersion>,
}

/// Reduce a raw reel item to its posting time and best media URL. Videos
/// win over their cover images; an item with neither is an error.
fn story_item_from_reel(item: ReelItem) -> Result<StoryItem, StoryError> {
    let ReelItem {
        id,
        taken_at,
        video_versions,
        image_versions2,
    } = item;
    let media_url = match video_versions.into_iter().next() {
        Some(video) => Some(video.url),
        None => image_versions2
            .and_then(|versions| versions.candidates.into_iter().next())
            .map(|candidate| candidate.url),
    };
    match media_url {
        Some(media_url) => Ok(StoryItem {
            taken_at,
            media_url,
        }),
        None => Err(StoryError::MissingMedia { item_id: id }),
    }
}

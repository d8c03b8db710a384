//! Story-service access: API client, session cache and backend selection.

pub mod api;
pub mod error;
pub mod session;

pub use error::StoryError;

use async_trait::async_trait;

use crate::config::SourceCredentials;
use crate::story::api::StoryApiClient;
use crate::story::session::{SessionState, SessionStore};

/// One story post, reduced to what the archiver needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoryItem {
    /// POSIX timestamp the story was posted at, second resolution.
    pub taken_at: i64,
    /// Direct URL of the best media variant.
    pub media_url: String,
}

/// Fetched story feeds keyed by account name, in listing order.
pub type AccountStories = Vec<(String, Vec<StoryItem>)>;

/// A source of stories. The sync pipeline drives exactly one backend and
/// calls it strictly sequentially.
#[async_trait]
pub trait StoryBackend: Send {
    /// Authenticate. Called once, before any fetch.
    async fn login(&mut self) -> Result<(), StoryError>;

    /// Fetch the current stories of one account, oldest first.
    async fn fetch_stories(&mut self, account: &str) -> Result<Vec<StoryItem>, StoryError>;

    /// Download one media URL to memory.
    async fn download_media(&mut self, url: &str) -> Result<Vec<u8>, StoryError>;
}

/// Login strategy for the sync command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum BackendKind {
    /// Resume the session cached on disk, logging in only when the cache
    /// is missing or rejected.
    #[default]
    Session,
    /// Log in afresh and leave the session cache alone.
    Direct,
}

/// Backend that persists login state in [`session::SESSION_FILE`].
pub struct CachedSessionBackend {
    client: StoryApiClient,
    store: SessionStore,
    resumed: bool,
}

impl CachedSessionBackend {
    pub fn new(creds: &SourceCredentials, store: SessionStore) -> Result<Self, StoryError> {
        let (state, resumed) = match store.load() {
            Some(state) => (state, true),
            None => (SessionState::fresh(), false),
        };
        let client = StoryApiClient::new(&creds.username, &creds.password, state)?;
        Ok(Self {
            client,
            store,
            resumed,
        })
    }
}

#[async_trait]
impl StoryBackend for CachedSessionBackend {
    async fn login(&mut self) -> Result<(), StoryError> {
        if self.resumed {
            match self.client.verify_session().await {
                Ok(true) => {
                    tracing::info!("Resumed cached session");
                    return Ok(());
                }
                Ok(false) => {
                    tracing::info!("Cached session rejected, logging in again");
                }
                Err(e) => return Err(e),
            }
        }
        self.client.login().await?;
        // The cache is only rewritten after a fresh login; a resumed
        // session leaves the file untouched.
        self.store.save(self.client.state())?;
        Ok(())
    }

    async fn fetch_stories(&mut self, account: &str) -> Result<Vec<StoryItem>, StoryError> {
        self.client.fetch_stories(account).await
    }

    async fn download_media(&mut self, url: &str) -> Result<Vec<u8>, StoryError> {
        self.client.download_media(url).await
    }
}

/// Backend that logs in afresh every run and never reads or writes the
/// session cache.
pub struct DirectLoginBackend {
    client: StoryApiClient,
}

impl DirectLoginBackend {
    pub fn new(creds: &SourceCredentials) -> Result<Self, StoryError> {
        let client =
            StoryApiClient::new(&creds.username, &creds.password, SessionState::fresh())?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StoryBackend for DirectLoginBackend {
    async fn login(&mut self) -> Result<(), StoryError> {
        self.client.login().await?;
        Ok(())
    }

    async fn fetch_stories(&mut self, account: &str) -> Result<Vec<StoryItem>, StoryError> {
        self.client.fetch_stories(account).await
    }

    async fn download_media(&mut self, url: &str) -> Result<Vec<u8>, StoryError> {
        self.client.download_media(url).await
    }
}

/// Construct the backend selected on the command line.
pub fn build_backend(
    kind: BackendKind,
    creds: &SourceCredentials,
) -> Result<Box<dyn StoryBackend>, StoryError> {
    match kind {
        BackendKind::Session => {
            let store = SessionStore::new(session::SESSION_FILE);
            Ok(Box::new(CachedSessionBackend::new(creds, store)?))
        }
        BackendKind::Direct => Ok(Box::new(DirectLoginBackend::new(creds)?)),
    }
}

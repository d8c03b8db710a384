//! The sync pipeline.
//!
//! One run is strictly sequential: log in, fetch every account's feed,
//! archive every item to disk, then mirror the new files to remote
//! storage. There is no ledger of what was uploaded before; a re-run over
//! the same stories archives them again under the next collision suffix
//! and uploads the copies. The first error aborts the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::archive::{self, apply_timestamp, extension_from_url, next_available_path};
use crate::config::{Config, USERNAMES_FILE};
use crate::remote::{ArchivalUploader, PCloudStore, RemoteStore};
use crate::story::{self, AccountStories, BackendKind, StoryBackend, StoryItem};
use crate::timestamp::StemCodec;

/// One file written by this run and the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub account: String,
    pub path: PathBuf,
}

pub async fn run_sync(config: &Config, backend_kind: BackendKind) -> Result<()> {
    // Validate both credential sets up front; failing after the archive
    // step would leave files mirrored nowhere.
    let source_creds = config.source_credentials()?;
    let remote_creds = config.remote_credentials()?;
    let mut backend = story::build_backend(backend_kind, &source_creds)?;
    let accounts = load_accounts(config).await?;
    tracing::info!(accounts = accounts.len(), "Starting story sync");

    let codec = StemCodec::new(config.timezone);
    let root = Path::new(archive::STORIES_DIR);

    backend.login().await?;
    let feeds = fetch_all(backend.as_mut(), &accounts).await?;
    let archived = archive_all(backend.as_mut(), &codec, root, feeds).await?;
    if archived.is_empty() {
        tracing::info!("No story items to mirror");
        return Ok(());
    }

    let mut store = PCloudStore::new()?;
    store
        .login(&remote_creds.email, &remote_creds.password)
        .await?;
    upload_all(&store, &archived).await?;
    tracing::info!(files = archived.len(), "Sync complete");
    Ok(())
}

/// Fetch every account's feed before touching the disk. Accounts are
/// queried in listing order; an unknown account aborts the run.
async fn fetch_all(backend: &mut dyn StoryBackend, accounts: &[String]) -> Result<AccountStories> {
    let mut feeds = AccountStories::new();
    for account in accounts {
        let items = backend
            .fetch_stories(account)
            .await
            .with_context(|| format!("Fetching stories for {account}"))?;
        tracing::info!(account = %account, items = items.len(), "Fetched story feed");
        feeds.push((account.clone(), items));
    }
    Ok(feeds)
}

async fn archive_all(
    backend: &mut dyn StoryBackend,
    codec: &StemCodec,
    root: &Path,
    feeds: AccountStories,
) -> Result<Vec<ArchivedFile>> {
    let mut archived = Vec::new();
    for (account, items) in feeds {
        let account_dir = root.join(&account);
        tokio::fs::create_dir_all(&account_dir)
            .await
            .with_context(|| format!("Creating {}", account_dir.display()))?;
        for item in items {
            let path = archive_item(backend, codec, &account_dir, &item).await?;
            tracing::info!("Archived {}", path.display());
            archived.push(ArchivedFile {
                account: account.clone(),
                path,
            });
        }
    }
    Ok(archived)
}

/// Download one story item and write it under its encoded-timestamp name,
/// then stamp the posting time onto the file.
async fn archive_item(
    backend: &mut dyn StoryBackend,
    codec: &StemCodec,
    account_dir: &Path,
    item: &StoryItem,
) -> Result<PathBuf> {
    let stem = codec.encode(item.taken_at);
    let extension = extension_from_url(&item.media_url)?;
    let path = next_available_path(account_dir, &stem, &extension)?;
    let bytes = backend
        .download_media(&item.media_url)
        .await
        .with_context(|| format!("Downloading {}", item.media_url))?;
    tokio::fs::write(&path, bytes)
        .await
        .with_context(|| format!("Writing {}", path.display()))?;
    apply_timestamp(&path, item.taken_at)
        .with_context(|| format!("Stamping {}", path.display()))?;
    Ok(path)
}

async fn upload_all(store: &dyn RemoteStore, archived: &[ArchivedFile]) -> Result<()> {
    let mut uploader = ArchivalUploader::new(store);
    for file in archived {
        uploader
            .upload_file(&file.account, &file.path)
            .await
            .with_context(|| format!("Uploading {}", file.path.display()))?;
        tracing::info!("Uploaded {}", file.path.display());
    }
    Ok(())
}

/// The accounts to archive: fetched from `USERNAMES_URL` when configured,
/// otherwise read from the local accounts file.
async fn load_accounts(config: &Config) -> Result<Vec<String>> {
    let raw = match &config.usernames_url {
        Some(url) => {
            let response = reqwest::get(url)
                .await
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("Fetching account list from {url}"))?;
            response.text().await.context("Reading account list body")?
        }
        None => std::fs::read_to_string(USERNAMES_FILE).with_context(|| {
            format!("USERNAMES_URL is not set and {USERNAMES_FILE} is unreadable")
        })?,
    };
    let accounts = parse_account_list(&raw);
    if accounts.is_empty() {
        bail!("Account list is empty");
    }
    Ok(accounts)
}

fn parse_account_list(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use chrono_tz::Tz;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::UNIX_EPOCH;

    use crate::remote::{RemoteError, RemoteFolderId};
    use crate::story::StoryError;

    struct ScriptedBackend {
        feeds: HashMap<String, Vec<StoryItem>>,
        media: HashMap<String, Vec<u8>>,
        logins: usize,
    }

    impl ScriptedBackend {
        fn new() -> Self {
            Self {
                feeds: HashMap::new(),
                media: HashMap::new(),
                logins: 0,
            }
        }
    }

    #[async_trait]
    impl StoryBackend for ScriptedBackend {
        async fn login(&mut self) -> Result<(), StoryError> {
            self.logins += 1;
            Ok(())
        }

        async fn fetch_stories(&mut self, account: &str) -> Result<Vec<StoryItem>, StoryError> {
            self.feeds
                .get(account)
                .cloned()
                .ok_or_else(|| StoryError::UnknownAccount(account.to_string()))
        }

        async fn download_media(&mut self, url: &str) -> Result<Vec<u8>, StoryError> {
            self.media.get(url).cloned().ok_or_else(|| StoryError::Api {
                status: 404,
                message: format!("no media at {url}"),
            })
        }
    }

    struct RecordingRemote {
        folders: Mutex<HashMap<String, u64>>,
        creates: Mutex<Vec<String>>,
        uploads: Mutex<Vec<String>>,
    }

    impl RecordingRemote {
        fn new() -> Self {
            Self {
                folders: Mutex::new(HashMap::new()),
                creates: Mutex::new(Vec::new()),
                uploads: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl RemoteStore for RecordingRemote {
        async fn find_folder(&self, name: &str) -> Result<Option<RemoteFolderId>, RemoteError> {
            Ok(self
                .folders
                .lock()
                .unwrap()
                .get(name)
                .map(|id| RemoteFolderId(*id)))
        }

        async fn create_folder(&self, name: &str) -> Result<(), RemoteError> {
            self.creates.lock().unwrap().push(name.to_string());
            let mut folders = self.folders.lock().unwrap();
            let id = 500 + folders.len() as u64;
            folders.insert(name.to_string(), id);
            Ok(())
        }

        async fn upload(&self, path: &Path, folder: &RemoteFolderId) -> Result<(), RemoteError> {
            self.uploads
                .lock()
                .unwrap()
                .push(format!("{} -> {}", path.display(), folder.0));
            Ok(())
        }
    }

    fn item(taken_at: i64, url: &str) -> StoryItem {
        StoryItem {
            taken_at,
            media_url: url.to_string(),
        }
    }

    fn mtime_of(path: &Path) -> i64 {
        let modified = std::fs::metadata(path).unwrap().modified().unwrap();
        modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_fetch_archive_upload_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("stories");
        let base = Utc
            .with_ymd_and_hms(2023, 9, 1, 6, 5, 0)
            .unwrap()
            .timestamp();

        let mut backend = ScriptedBackend::new();
        backend.feeds.insert(
            "alice".to_string(),
            vec![
                item(base + 12, "https://cdn.example.com/a/one.jpg?tag=1"),
                // Same minute as the first item, so the name collides.
                item(base + 40, "https://cdn.example.com/a/two.jpg"),
            ],
        );
        backend.feeds.insert(
            "bob".to_string(),
            vec![item(base + 75, "https://cdn.example.com/b/clip.mp4")],
        );
        for (url, bytes) in [
            ("https://cdn.example.com/a/one.jpg?tag=1", b"one".to_vec()),
            ("https://cdn.example.com/a/two.jpg", b"two".to_vec()),
            ("https://cdn.example.com/b/clip.mp4", b"clip".to_vec()),
        ] {
            backend.media.insert(url.to_string(), bytes);
        }

        backend.login().await.unwrap();
        let accounts = vec!["alice".to_string(), "bob".to_string()];
        let feeds = fetch_all(&mut backend, &accounts).await.unwrap();
        let codec = StemCodec::new(Some(Tz::UTC));
        let archived = archive_all(&mut backend, &codec, &root, feeds)
            .await
            .unwrap();

        assert_eq!(backend.logins, 1);
        assert_eq!(archived.len(), 3);
        let alice_first = root.join("alice/2023-09-01 6.05am.jpg");
        let alice_second = root.join("alice/2023-09-01 6.05am (1).jpg");
        let bob_clip = root.join("bob/2023-09-01 6.06am.mp4");
        assert_eq!(std::fs::read(&alice_first).unwrap(), b"one");
        assert_eq!(std::fs::read(&alice_second).unwrap(), b"two");
        assert_eq!(std::fs::read(&bob_clip).unwrap(), b"clip");
        // File times carry the full posting time, seconds included.
        assert_eq!(mtime_of(&alice_first), base + 12);
        assert_eq!(mtime_of(&alice_second), base + 40);
        assert_eq!(mtime_of(&bob_clip), base + 75);

        let remote = RecordingRemote::new();
        upload_all(&remote, &archived).await.unwrap();
        let uploads = remote.uploads.lock().unwrap().clone();
        assert_eq!(uploads.len(), 3);
        assert!(uploads[0].contains("6.05am.jpg"));
        // One folder creation per account, in first-seen order.
        assert_eq!(*remote.creates.lock().unwrap(), vec!["alice", "bob"]);
    }

    #[tokio::test]
    async fn test_rerun_archives_duplicates_instead_of_skipping() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("stories");
        let base = Utc
            .with_ymd_and_hms(2023, 9, 1, 6, 5, 0)
            .unwrap()
            .timestamp();

        let mut backend = ScriptedBackend::new();
        backend.feeds.insert(
            "alice".to_string(),
            vec![item(base + 12, "https://cdn.example.com/a/one.jpg")],
        );
        backend
            .media
            .insert("https://cdn.example.com/a/one.jpg".to_string(), b"one".to_vec());

        let codec = StemCodec::new(Some(Tz::UTC));
        let accounts = vec!["alice".to_string()];
        for _ in 0..2 {
            let feeds = fetch_all(&mut backend, &accounts).await.unwrap();
            archive_all(&mut backend, &codec, &root, feeds)
                .await
                .unwrap();
        }

        // The second run re-downloaded the same story into the next
        // collision slot rather than skipping it.
        assert!(root.join("alice/2023-09-01 6.05am.jpg").exists());
        assert!(root.join("alice/2023-09-01 6.05am (1).jpg").exists());
    }

    #[tokio::test]
    async fn test_fetch_all_unknown_account_is_fatal() {
        let mut backend = ScriptedBackend::new();
        let err = fetch_all(&mut backend, &["ghost".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[tokio::test]
    async fn test_archive_item_failed_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut backend = ScriptedBackend::new();
        let codec = StemCodec::new(Some(Tz::UTC));
        let story = item(1_693_548_330, "https://cdn.example.com/gone.jpg");
        let err = archive_item(&mut backend, &codec, dir.path(), &story)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("gone.jpg"));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_parse_account_list() {
        assert_eq!(
            parse_account_list("alice\n  bob  \n\ncarol\n"),
            vec!["alice", "bob", "carol"]
        );
        assert!(parse_account_list("").is_empty());
        assert!(parse_account_list("\n   \n").is_empty());
    }
}

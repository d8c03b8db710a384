//! Remote mirror: storage trait, pCloud implementation and the uploader.

pub mod error;
pub mod pcloud;

pub use error::RemoteError;
pub use pcloud::PCloudStore;

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;

/// Opaque identifier of a folder on the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFolderId(pub u64);

/// Storage service the archive is mirrored to. Implementations are rooted
/// at the service-side stories folder; `name` is always a bare account
/// folder name, not a path.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Look up a folder under the root by name.
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteFolderId>, RemoteError>;

    /// Create a folder under the root. Returns no identifier; callers look
    /// the folder up again afterwards. Creating a folder that already
    /// exists is not an error.
    async fn create_folder(&self, name: &str) -> Result<(), RemoteError>;

    /// Upload a local file into a folder. Uploading the same path twice
    /// creates two remote objects; nothing here deduplicates.
    async fn upload(&self, path: &Path, folder: &RemoteFolderId) -> Result<(), RemoteError>;
}

/// Uploads archived files into per-account remote folders, resolving each
/// folder at most once per run.
pub struct ArchivalUploader<'a> {
    store: &'a dyn RemoteStore,
    folders: HashMap<String, RemoteFolderId>,
}

impl<'a> ArchivalUploader<'a> {
    pub fn new(store: &'a dyn RemoteStore) -> Self {
        Self {
            store,
            folders: HashMap::new(),
        }
    }

    /// Resolve the remote folder for `account`, creating it on first
    /// sight. The result is memoized for the rest of the run.
    pub async fn ensure_folder(&mut self, account: &str) -> Result<RemoteFolderId, RemoteError> {
        if let Some(id) = self.folders.get(account) {
            return Ok(id.clone());
        }
        let id = match self.store.find_folder(account).await? {
            Some(id) => id,
            None => {
                self.store.create_folder(account).await?;
                self.store
                    .find_folder(account)
                    .await?
                    .ok_or_else(|| RemoteError::FolderVanished(account.to_string()))?
            }
        };
        self.folders.insert(account.to_string(), id.clone());
        Ok(id)
    }

    /// Upload one archived file into its account folder.
    pub async fn upload_file(&mut self, account: &str, path: &Path) -> Result<(), RemoteError> {
        let folder = self.ensure_folder(account).await?;
        self.store.upload(path, &folder).await
    }
}

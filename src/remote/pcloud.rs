//! pCloud storage client.
//!
//! Thin wrapper over the pCloud HTTP JSON API (<https://docs.pcloud.com>).
//! Every call returns HTTP 200 with a numeric `result` field; non-zero
//! results are the real errors. Accounts registered in the EU data region
//! live on `eapi.pcloud.com` instead; tokens are not portable between the
//! two hosts.

use std::path::Path;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::archive::STORIES_DIR;
use crate::remote::{RemoteError, RemoteFolderId, RemoteStore};

const API_BASE: &str = "https://api.pcloud.com";
/// result code: a file or folder with the requested name already exists.
const RESULT_ALREADY_EXISTS: u32 = 2004;
/// result code: directory does not exist.
const RESULT_NOT_FOUND: u32 = 2005;

/// pCloud-backed [`RemoteStore`], rooted at `/stories`.
pub struct PCloudStore {
    client: reqwest::Client,
    auth: Option<String>,
    root_folder_id: Option<u64>,
}

impl PCloudStore {
    pub fn new() -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            auth: None,
            root_folder_id: None,
        })
    }

    /// Exchange credentials for an auth token and resolve (creating if
    /// needed) the root stories folder.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<(), RemoteError> {
        let response: UserInfoResponse = self
            .call(
                "userinfo",
                &[("getauth", "1"), ("username", email), ("password", password)],
            )
            .await?;
        if response.result != 0 {
            return Err(RemoteError::LoginRejected(
                response
                    .error
                    .unwrap_or_else(|| format!("result code {}", response.result)),
            ));
        }
        match response.auth {
            Some(auth) => self.auth = Some(auth),
            None => {
                return Err(RemoteError::LoginRejected(
                    "login response carried no auth token".to_string(),
                ));
            }
        }
        self.ensure_root().await?;
        tracing::info!("Logged in to remote storage");
        Ok(())
    }

    async fn ensure_root(&mut self) -> Result<(), RemoteError> {
        let auth = self.auth()?.to_string();
        let path = format!("/{STORIES_DIR}");
        let response: FolderResponse = self
            .call("createfolderifnotexists", &[("auth", &auth), ("path", &path)])
            .await?;
        if response.result != 0 {
            return Err(api_error(response.result, response.error));
        }
        match response.metadata.and_then(|m| m.folderid) {
            Some(id) => {
                self.root_folder_id = Some(id);
                Ok(())
            }
            None => Err(RemoteError::Api {
                code: 0,
                message: "folder response carried no folderid".to_string(),
            }),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<T, RemoteError> {
        let url = format!("{API_BASE}/{method}");
        let response = self.client.get(url).query(query).send().await?;
        Ok(response.json::<T>().await?)
    }

    fn auth(&self) -> Result<&str, RemoteError> {
        self.auth.as_deref().ok_or(RemoteError::NotLoggedIn)
    }

    fn root(&self) -> Result<u64, RemoteError> {
        self.root_folder_id.ok_or(RemoteError::NotLoggedIn)
    }
}

#[async_trait]
impl RemoteStore for PCloudStore {
    async fn find_folder(&self, name: &str) -> Result<Option<RemoteFolderId>, RemoteError> {
        let auth = self.auth()?.to_string();
        let folderid = self.root()?.to_string();
        let response: FolderResponse = self
            .call("listfolder", &[("auth", &auth), ("folderid", &folderid)])
            .await?;
        match response.result {
            0 => {}
            RESULT_NOT_FOUND => return Ok(None),
            code => return Err(api_error(code, response.error)),
        }
        match response.metadata {
            Some(listing) => Ok(child_folder_id(&listing, name)),
            None => Ok(None),
        }
    }

    async fn create_folder(&self, name: &str) -> Result<(), RemoteError> {
        let auth = self.auth()?.to_string();
        let folderid = self.root()?.to_string();
        let response: FolderResponse = self
            .call(
                "createfolder",
                &[("auth", &auth), ("folderid", &folderid), ("name", name)],
            )
            .await?;
        match response.result {
            // 2004 means the folder is already there, which is fine here.
            0 | RESULT_ALREADY_EXISTS => Ok(()),
            code => Err(api_error(code, response.error)),
        }
    }

    async fn upload(&self, path: &Path, folder: &RemoteFolderId) -> Result<(), RemoteError> {
        let auth = self.auth()?.to_string();
        let folderid = folder.0.to_string();
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("")
            .to_string();
        let form =
            multipart::Form::new().part("file", multipart::Part::bytes(bytes).file_name(file_name));
        let response = self
            .client
            .post(format!("{API_BASE}/uploadfile"))
            .query(&[
                ("auth", auth.as_str()),
                ("folderid", folderid.as_str()),
                // Renamed, not replaced, when the name is already taken.
                ("renameifexists", "1"),
            ])
            .multipart(form)
            .send()
            .await?;
        let parsed: UploadResponse = response.json().await?;
        if parsed.result != 0 {
            return Err(api_error(parsed.result, parsed.error));
        }
        tracing::debug!("Uploaded {}", path.display());
        Ok(())
    }
}

fn api_error(result: u32, error: Option<String>) -> RemoteError {
    RemoteError::Api {
        code: result,
        message: error.unwrap_or_else(|| "unknown error".to_string()),
    }
}

/// Find the subfolder called `name` in a folder listing. Plain files with
/// the same name do not count.
fn child_folder_id(listing: &FolderMetadata, name: &str) -> Option<RemoteFolderId> {
    listing
        .contents
        .iter()
        .find(|entry| entry.isfolder && entry.name == name)
        .and_then(|entry| entry.folderid)
        .map(RemoteFolderId)
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    result: u32,
    error: Option<String>,
    auth: Option<String>,
}

/// Shared shape of `listfolder`, `createfolder` and
/// `createfolderifnotexists` responses.
#[derive(Debug, Deserialize)]
struct FolderResponse {
    result: u32,
    error: Option<String>,
    metadata: Option<FolderMetadata>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    result: u32,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FolderMetadata {
    folderid: Option<u64>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    isfolder: bool,
    #[serde(default)]
    contents: Vec<FolderMetadata>,
}

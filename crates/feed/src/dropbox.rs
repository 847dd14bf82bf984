//! Dropbox HTTP backend for [`FileStore`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::store::{FileMeta, FileStore, FileStoreError, ListPage, RemoteEntry};

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct DropboxClient {
    http: Client,
    token: String,
    api_base: String,
    content_base: String,
}

impl std::fmt::Debug for DropboxClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxClient")
            .field("api_base", &self.api_base)
            .field("content_base", &self.content_base)
            .finish_non_exhaustive()
    }
}

impl DropboxClient {
    pub fn new(token: impl Into<String>) -> Result<Self, FileStoreError> {
        Self::with_base_urls(token, API_BASE, CONTENT_BASE)
    }

    pub fn with_base_urls(
        token: impl Into<String>,
        api_base: impl Into<String>,
        content_base: impl Into<String>,
    ) -> Result<Self, FileStoreError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| FileStoreError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            token: token.into(),
            api_base: api_base.into(),
            content_base: content_base.into(),
        })
    }

    fn rpc(&self, endpoint: &str, body: serde_json::Value) -> Result<Response, FileStoreError> {
        self.http
            .post(format!("{}/{endpoint}", self.api_base))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .map_err(|e| FileStoreError::Transport(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct WireListResult {
    entries: Vec<WireEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum WireEntry {
    File {
        id: String,
        name: String,
        #[serde(default)]
        path_lower: Option<String>,
        server_modified: DateTime<Utc>,
    },
    Folder {
        name: String,
        #[serde(default)]
        path_lower: Option<String>,
    },
    Deleted {
        name: String,
        #[serde(default)]
        path_lower: Option<String>,
    },
}

impl From<WireEntry> for RemoteEntry {
    fn from(entry: WireEntry) -> Self {
        match entry {
            WireEntry::File {
                id,
                name,
                path_lower,
                server_modified,
            } => RemoteEntry::File(FileMeta {
                id,
                path_lower: path_lower.unwrap_or_default(),
                name,
                server_modified,
            }),
            WireEntry::Folder { name, path_lower } => RemoteEntry::Folder {
                path_lower: path_lower.unwrap_or_default(),
                name,
            },
            WireEntry::Deleted { name, path_lower } => RemoteEntry::Deleted {
                path_lower: path_lower.unwrap_or_default(),
                name,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct WireError {
    #[serde(default)]
    error_summary: String,
}

fn error_from(response: Response) -> FileStoreError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<WireError>(&body)
        .map(|e| e.error_summary)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or(body);
    FileStoreError::Api { status, message }
}

fn read_page(response: Response) -> Result<ListPage, FileStoreError> {
    if !response.status().is_success() {
        return Err(error_from(response));
    }
    let result: WireListResult = response
        .json()
        .map_err(|e| FileStoreError::Decode(e.to_string()))?;
    Ok(ListPage {
        entries: result.entries.into_iter().map(RemoteEntry::from).collect(),
        cursor: result.cursor,
        has_more: result.has_more,
    })
}

impl FileStore for DropboxClient {
    #[instrument(skip(self))]
    fn list_folder(&self, path: &str, recursive: bool) -> Result<ListPage, FileStoreError> {
        let response = self.rpc(
            "files/list_folder",
            json!({ "path": path, "recursive": recursive, "include_deleted": false }),
        )?;
        let page = read_page(response)?;
        debug!(entries = page.entries.len(), has_more = page.has_more, "listed folder");
        Ok(page)
    }

    #[instrument(skip_all)]
    fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, FileStoreError> {
        let response = self.rpc("files/list_folder/continue", json!({ "cursor": cursor }))?;
        if response.status() == StatusCode::CONFLICT {
            // 409 on continue means the cursor is reset or malformed.
            return Err(match error_from(response) {
                FileStoreError::Api { message, .. } => FileStoreError::InvalidCursor(message),
                other => other,
            });
        }
        let page = read_page(response)?;
        debug!(entries = page.entries.len(), has_more = page.has_more, "continued listing");
        Ok(page)
    }

    #[instrument(skip(self))]
    fn download(&self, file_id: &str) -> Result<String, FileStoreError> {
        let arg = json!({ "path": file_id }).to_string();
        let response = self
            .http
            .post(format!("{}/files/download", self.content_base))
            .bearer_auth(&self.token)
            .header("Dropbox-API-Arg", arg)
            .send()
            .map_err(|e| FileStoreError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(error_from(response));
        }
        response.text().map_err(|e| FileStoreError::Decode(e.to_string()))
    }
}

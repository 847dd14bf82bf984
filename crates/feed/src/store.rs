//! `FileStore` capability: the remote file storage the exports land in.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of a remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub path_lower: String,
    pub name: String,
    pub server_modified: DateTime<Utc>,
}

/// One entry of a folder listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEntry {
    File(FileMeta),
    Folder { path_lower: String, name: String },
    Deleted { path_lower: String, name: String },
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub cursor: String,
    pub has_more: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum FileStoreError {
    /// The continuation cursor was rejected; a full listing is needed.
    #[error("cursor rejected: {0}")]
    InvalidCursor(String),

    #[error("file store api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("file store transport error: {0}")]
    Transport(String),

    #[error("file store response could not be decoded: {0}")]
    Decode(String),
}

impl FileStoreError {
    pub fn is_transient(&self) -> bool {
        match self {
            FileStoreError::Transport(_) => true,
            FileStoreError::Api { status, .. } => *status == 429 || *status >= 500,
            FileStoreError::InvalidCursor(_) | FileStoreError::Decode(_) => false,
        }
    }
}

pub trait FileStore: Send + Sync {
    fn list_folder(&self, path: &str, recursive: bool) -> Result<ListPage, FileStoreError>;

    fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, FileStoreError>;

    /// Download a file's content as text.
    fn download(&self, file_id: &str) -> Result<String, FileStoreError>;
}

impl<S: FileStore + ?Sized> FileStore for Arc<S> {
    fn list_folder(&self, path: &str, recursive: bool) -> Result<ListPage, FileStoreError> {
        (**self).list_folder(path, recursive)
    }

    fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, FileStoreError> {
        (**self).list_folder_continue(cursor)
    }

    fn download(&self, file_id: &str) -> Result<String, FileStoreError> {
        (**self).download(file_id)
    }
}

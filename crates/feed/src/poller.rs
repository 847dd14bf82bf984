//! Change-feed poller.
//!
//! Lists what changed in the export folder since the persisted cursor. A
//! missing or rejected cursor falls back to a full recursive listing.

use tracing::{debug, info, instrument, warn};

use stocksync_infra::keys::CURSOR_TTL;
use stocksync_infra::{CursorScope, CursorStore, StoreError};

use crate::store::{FileMeta, FileStore, FileStoreError, RemoteEntry};

/// A change reported by the feed. Folders never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEntry {
    Added(FileMeta),
    Deleted { path_lower: String, name: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error(transparent)]
    FileStore(#[from] FileStoreError),

    #[error("cursor store: {0}")]
    Store(#[from] StoreError),
}

impl PollError {
    pub fn is_transient(&self) -> bool {
        match self {
            PollError::FileStore(e) => e.is_transient(),
            PollError::Store(e) => e.is_transient(),
        }
    }
}

#[derive(Debug)]
pub struct ChangeFeedPoller<F, C> {
    files: F,
    cursors: C,
    scope: CursorScope,
    root: String,
}

impl<F: FileStore, C: CursorStore> ChangeFeedPoller<F, C> {
    pub fn new(files: F, cursors: C, scope: CursorScope, root: impl Into<String>) -> Self {
        Self {
            files,
            cursors,
            scope,
            root: root.into(),
        }
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    /// Collect every change after `cursor`, following pagination to the end.
    pub fn poll_from(&self, cursor: Option<&str>) -> Result<(Vec<ChangeEntry>, String), PollError> {
        let mut cursor = cursor.map(str::to_owned);
        let mut entries = Vec::new();

        loop {
            let page = match cursor.as_deref() {
                Some(current) => match self.files.list_folder_continue(current) {
                    Ok(page) => page,
                    Err(FileStoreError::InvalidCursor(reason)) => {
                        warn!(reason = %reason, "cursor rejected, falling back to full listing");
                        entries.clear();
                        self.files.list_folder(&self.root, true)?
                    }
                    Err(e) => return Err(e.into()),
                },
                None => self.files.list_folder(&self.root, true)?,
            };

            entries.extend(page.entries.into_iter().filter_map(|entry| match entry {
                RemoteEntry::File(meta) => Some(ChangeEntry::Added(meta)),
                RemoteEntry::Deleted { path_lower, name } => Some(ChangeEntry::Deleted { path_lower, name }),
                RemoteEntry::Folder { .. } => None,
            }));
            cursor = Some(page.cursor);

            if !page.has_more {
                break;
            }
        }

        Ok((entries, cursor.unwrap_or_default()))
    }

    /// Poll from the persisted cursor and persist the new one.
    #[instrument(skip(self), fields(integration = %self.scope.integration, account = %self.scope.account))]
    pub fn poll(&self) -> Result<Vec<ChangeEntry>, PollError> {
        let stored = self.cursors.load(&self.scope)?;
        if stored.is_none() {
            info!("no stored cursor, listing the export folder");
        }
        let (entries, cursor) = self.poll_from(stored.as_deref())?;
        self.cursors.save(&self.scope, &cursor, CURSOR_TTL)?;

        for entry in &entries {
            if let ChangeEntry::Deleted { path_lower, .. } = entry {
                info!(path = %path_lower, "remote file deleted");
            }
        }
        debug!(changes = entries.len(), "poll complete");
        Ok(entries)
    }

    /// Establish a cursor if none is stored, so only later changes are seen.
    ///
    /// Returns `true` when a full listing was taken.
    #[instrument(skip(self), fields(integration = %self.scope.integration, account = %self.scope.account))]
    pub fn prime(&self) -> Result<bool, PollError> {
        if self.cursors.load(&self.scope)?.is_some() {
            debug!("cursor present, nothing to prime");
            return Ok(false);
        }
        let (entries, cursor) = self.poll_from(None)?;
        self.cursors.save(&self.scope, &cursor, CURSOR_TTL)?;
        info!(existing_files = entries.len(), "change cursor primed");
        Ok(true)
    }

    /// Forget the cursor; the next poll starts with a full listing.
    pub fn reset(&self) -> Result<(), PollError> {
        self.cursors.delete(&self.scope)?;
        info!("change cursor deleted");
        Ok(())
    }
}

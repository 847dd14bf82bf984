//! In-memory [`FileStore`] for tests and local runs.
//!
//! Cursors are positions in the change log, tagged with a generation so that
//! [`InMemoryFileStore::invalidate_cursors`] can reject every outstanding one.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::store::{FileMeta, FileStore, FileStoreError, ListPage, RemoteEntry};

#[derive(Debug, Default)]
struct State {
    files: BTreeMap<String, (FileMeta, String)>,
    log: Vec<RemoteEntry>,
    generation: u32,
    fail_next: Option<FileStoreError>,
    full_listings: usize,
}

impl State {
    fn cursor(&self, position: usize) -> String {
        format!("g{}:{}", self.generation, position)
    }

    fn parse_cursor(&self, cursor: &str) -> Option<usize> {
        let (generation, position) = cursor.strip_prefix('g')?.split_once(':')?;
        if generation.parse::<u32>().ok()? != self.generation {
            return None;
        }
        position.parse().ok()
    }
}

#[derive(Debug)]
pub struct InMemoryFileStore {
    page_size: usize,
    state: Mutex<State>,
}

impl Default for InMemoryFileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::with_page_size(100)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            state: Mutex::new(State::default()),
        }
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, State>, FileStoreError> {
        self.state
            .lock()
            .map_err(|_| FileStoreError::Transport("file store mutex poisoned".to_string()))
    }

    /// Add (or replace) a file and record the change. Returns its id.
    pub fn put_file(&self, folder: &str, name: &str, modified: DateTime<Utc>, content: &str) -> String {
        let Ok(mut state) = self.state.lock() else {
            return String::new();
        };
        let id = format!("id:{}", name.to_lowercase());
        let meta = FileMeta {
            id: id.clone(),
            path_lower: format!("{}/{}", folder.trim_end_matches('/'), name).to_lowercase(),
            name: name.to_string(),
            server_modified: modified,
        };
        state.log.push(RemoteEntry::File(meta.clone()));
        state.files.insert(id.clone(), (meta, content.to_string()));
        id
    }

    pub fn put_folder(&self, path: &str) {
        if let Ok(mut state) = self.state.lock() {
            let name = path.rsplit('/').next().unwrap_or(path).to_string();
            state.log.push(RemoteEntry::Folder {
                path_lower: path.to_lowercase(),
                name,
            });
        }
    }

    pub fn delete_file(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            if let Some((meta, _)) = state.files.remove(id) {
                state.log.push(RemoteEntry::Deleted {
                    path_lower: meta.path_lower,
                    name: meta.name,
                });
            }
        }
    }

    /// Reject all cursors handed out so far.
    pub fn invalidate_cursors(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.generation += 1;
        }
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: FileStoreError) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_next = Some(error);
        }
    }

    /// Number of full listings served so far.
    pub fn full_listings(&self) -> usize {
        self.state.lock().map(|s| s.full_listings).unwrap_or(0)
    }
}

impl FileStore for InMemoryFileStore {
    fn list_folder(&self, _path: &str, _recursive: bool) -> Result<ListPage, FileStoreError> {
        let mut state = self.state()?;
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state.full_listings += 1;
        let entries = state
            .files
            .values()
            .map(|(meta, _)| RemoteEntry::File(meta.clone()))
            .collect();
        Ok(ListPage {
            entries,
            cursor: state.cursor(state.log.len()),
            has_more: false,
        })
    }

    fn list_folder_continue(&self, cursor: &str) -> Result<ListPage, FileStoreError> {
        let mut state = self.state()?;
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        let start = state
            .parse_cursor(cursor)
            .filter(|position| *position <= state.log.len())
            .ok_or_else(|| FileStoreError::InvalidCursor(format!("reset: {cursor}")))?;
        let end = (start + self.page_size).min(state.log.len());
        Ok(ListPage {
            entries: state.log[start..end].to_vec(),
            cursor: state.cursor(end),
            has_more: end < state.log.len(),
        })
    }

    fn download(&self, file_id: &str) -> Result<String, FileStoreError> {
        let mut state = self.state()?;
        if let Some(error) = state.fail_next.take() {
            return Err(error);
        }
        state
            .files
            .get(file_id)
            .map(|(_, content)| content.clone())
            .ok_or_else(|| FileStoreError::Api {
                status: 409,
                message: format!("path/not_found/: {file_id}"),
            })
    }
}

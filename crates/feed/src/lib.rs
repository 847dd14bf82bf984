//! Change-feed side of the sync: listing remote exports, classifying them and
//! tracking their import lifecycle.

pub mod classify;
pub mod dropbox;
pub mod import_file;
pub mod memory;
pub mod poller;
pub mod store;

pub use classify::{Classification, ClassificationError, Classifier, ExportType};
pub use dropbox::DropboxClient;
pub use import_file::{ImportFile, ImportStatus, LatestSelection, select_latest};
pub use memory::InMemoryFileStore;
pub use poller::{ChangeEntry, ChangeFeedPoller, PollError};
pub use store::{FileMeta, FileStore, FileStoreError, ListPage, RemoteEntry};

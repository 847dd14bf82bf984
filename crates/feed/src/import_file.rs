//! Lifecycle of a classified export file.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stocksync_core::{DomainError, TenantName};

use crate::classify::{Classification, ExportType};
use crate::store::FileMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportStatus {
    NotImported,
    InProgress,
    Imported,
    /// Never imported; a newer file of the same tenant and type superseded it.
    Expired,
}

impl ImportStatus {
    fn can_move_to(self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        self == next || matches!((self, next), (NotImported, InProgress | Expired) | (InProgress, Imported))
    }
}

/// A remote export file together with its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFile {
    pub remote_id: String,
    pub path: String,
    pub filename: String,
    pub modified: DateTime<Utc>,
    pub export_type: ExportType,
    pub tenant: TenantName,
    status: ImportStatus,
}

impl ImportFile {
    pub fn new(meta: FileMeta, classification: Classification) -> Self {
        Self {
            remote_id: meta.id,
            path: meta.path_lower,
            filename: meta.name,
            modified: meta.server_modified,
            export_type: classification.export_type,
            tenant: classification.tenant,
            status: ImportStatus::NotImported,
        }
    }

    pub fn status(&self) -> ImportStatus {
        self.status
    }

    /// Move forward in the lifecycle. Backward moves are rejected.
    pub fn advance(&mut self, next: ImportStatus) -> Result<(), DomainError> {
        if !self.status.can_move_to(next) {
            return Err(DomainError::conflict(format!(
                "{}: cannot move from {:?} to {:?}",
                self.filename, self.status, next
            )));
        }
        self.status = next;
        Ok(())
    }
}

/// Files picked for import and the ones they superseded.
#[derive(Debug, Default)]
pub struct LatestSelection {
    pub selected: Vec<ImportFile>,
    pub expired: Vec<ImportFile>,
}

/// Keep only the most recently modified file per (tenant, export type); older
/// not-yet-imported files of the same pair are marked expired.
pub fn select_latest(files: impl IntoIterator<Item = ImportFile>) -> LatestSelection {
    let mut groups: BTreeMap<(TenantName, ExportType), Vec<ImportFile>> = BTreeMap::new();
    for file in files {
        groups
            .entry((file.tenant.clone(), file.export_type.clone()))
            .or_default()
            .push(file);
    }

    let mut selection = LatestSelection::default();
    for (_, mut group) in groups {
        // The filename starts with a 14-digit timestamp, so it breaks ties.
        group.sort_by(|a, b| (a.modified, &a.filename).cmp(&(b.modified, &b.filename)));
        let Some(latest) = group.pop() else { continue };
        for mut older in group {
            if older.advance(ImportStatus::Expired).is_ok() {
                selection.expired.push(older);
            }
        }
        selection.selected.push(latest);
    }
    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(name: &str, tenant: &str, export_type: ExportType, minute: u32) -> ImportFile {
        ImportFile::new(
            FileMeta {
                id: format!("id:{name}"),
                path_lower: format!("/e-commerce/{}", name.to_lowercase()),
                name: name.to_string(),
                server_modified: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            },
            Classification {
                export_type,
                tenant: TenantName::new(tenant).unwrap(),
            },
        )
    }

    #[test]
    fn status_moves_forward_only() {
        let mut f = file("a.csv", "Acme", ExportType::Inventory, 0);
        assert_eq!(f.status(), ImportStatus::NotImported);
        f.advance(ImportStatus::InProgress).unwrap();
        f.advance(ImportStatus::InProgress).unwrap();
        f.advance(ImportStatus::Imported).unwrap();
        assert!(f.advance(ImportStatus::NotImported).is_err());
        assert!(f.advance(ImportStatus::Expired).is_err());
        assert_eq!(f.status(), ImportStatus::Imported);
    }

    #[test]
    fn in_progress_file_cannot_expire() {
        let mut f = file("a.csv", "Acme", ExportType::Inventory, 0);
        f.advance(ImportStatus::InProgress).unwrap();
        assert!(f.advance(ImportStatus::Expired).is_err());
    }

    #[test]
    fn latest_file_wins_per_tenant_and_type() {
        let selection = select_latest(vec![
            file("old_inv", "Acme", ExportType::Inventory, 1),
            file("new_inv", "Acme", ExportType::Inventory, 5),
            file("prod", "Acme", ExportType::Product, 2),
            file("theia_inv", "Theia", ExportType::Inventory, 0),
        ]);

        let mut selected: Vec<_> = selection.selected.iter().map(|f| f.filename.as_str()).collect();
        selected.sort();
        assert_eq!(selected, ["new_inv", "prod", "theia_inv"]);

        assert_eq!(selection.expired.len(), 1);
        assert_eq!(selection.expired[0].filename, "old_inv");
        assert_eq!(selection.expired[0].status(), ImportStatus::Expired);
    }

    #[test]
    fn status_serializes_screaming() {
        let json = serde_json::to_string(&ImportStatus::NotImported).unwrap();
        assert_eq!(json, "\"NOT_IMPORTED\"");
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata record of a system backup run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemBackup {
    pub id: Uuid,
    pub status: String,
    pub entity_counts: serde_json::Value,
    pub note: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SystemBackupRow {
    pub id: String,
    pub status: String,
    pub entity_counts: serde_json::Value,
    pub note: Option<String>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
}

impl From<SystemBackupRow> for SystemBackup {
    fn from(row: SystemBackupRow) -> Self {
        Self {
            id: Uuid::parse_str(&row.id).unwrap_or_default(),
            status: row.status,
            entity_counts: row.entity_counts,
            note: row.note,
            created_by: row.created_by.and_then(|id| Uuid::parse_str(&id).ok()),
            created_at: row.created_at,
            restored_at: row.restored_at,
        }
    }
}

impl<'r> sqlx::FromRow<'r, sqlx::mysql::MySqlRow> for SystemBackup {
    fn from_row(row: &'r sqlx::mysql::MySqlRow) -> Result<Self, sqlx::Error> {
        Ok(SystemBackup::from(SystemBackupRow::from_row(row)?))
    }
}

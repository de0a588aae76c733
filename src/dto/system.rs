use serde::Deserialize;

/// POST /system/backups body.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateBackupRequest {
    pub note: Option<String>,
}

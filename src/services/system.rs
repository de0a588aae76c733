use sqlx::MySqlPool;
use uuid::Uuid;

use crate::error::ApiError;
use crate::middleware::RequestMeta;
use crate::models::{actions, SystemBackup};
use crate::repositories::BackupRepository;
use crate::services::audit::{AuditEvent, AuditService};

/// Operational backup records: point-in-time entity counts plus restore
/// bookkeeping. The byte-level dump itself is the deployment's concern.
#[derive(Clone)]
pub struct SystemService {
    backup_repo: BackupRepository,
    audit: AuditService,
}

impl SystemService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            backup_repo: BackupRepository::new(pool.clone()),
            audit: AuditService::new(pool),
        }
    }

    pub async fn create_backup(
        &self,
        note: Option<&str>,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<SystemBackup, ApiError> {
        let counts = self.backup_repo.entity_counts().await?;
        let backup = self
            .backup_repo
            .create(Uuid::new_v4(), "completed", counts, note, Some(actor))
            .await?;

        self.audit
            .record(
                AuditEvent::by_user(actor, actions::BACKUP_CREATED, "backup")
                    .resource(backup.id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        Ok(backup)
    }

    pub async fn list_backups(&self) -> Result<Vec<SystemBackup>, ApiError> {
        Ok(self.backup_repo.list().await?)
    }

    pub async fn restore_backup(
        &self,
        id: Uuid,
        actor: Uuid,
        meta: &RequestMeta,
    ) -> Result<SystemBackup, ApiError> {
        let backup = self
            .backup_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("backup not found".to_string()))?;
        self.backup_repo.mark_restored(id).await?;

        self.audit
            .record(
                AuditEvent::by_user(actor, actions::BACKUP_RESTORED, "backup")
                    .resource(backup.id.to_string())
                    .from_addr(meta.ip(), meta.user_agent()),
            )
            .await;
        self.backup_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("backup not found".to_string()))
    }
}

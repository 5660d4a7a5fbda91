//! Scheduled stage-advance tasks for crops

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{decode, CropStage, Lookup, PlannedTask};
use shared::DomainError;

/// Crop task service for the stage-advance work queue
#[derive(Clone)]
pub struct CropTaskService {
    db: PgPool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CropTaskStatus {
    Pending,
    Completed,
    Cancelled,
}

impl CropTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CropTaskStatus::Pending => "pending",
            CropTaskStatus::Completed => "completed",
            CropTaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for CropTaskStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, DomainError> {
        match s {
            "pending" => Ok(CropTaskStatus::Pending),
            "completed" => Ok(CropTaskStatus::Completed),
            "cancelled" => Ok(CropTaskStatus::Cancelled),
            _ => Err(DomainError::UnknownCode {
                kind: "crop_task_status",
                code: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CropTask {
    pub id: Uuid,
    pub crop_id: Uuid,
    pub task_type: String,
    pub target_stage: CropStage,
    pub due_at: DateTime<Utc>,
    pub status: CropTaskStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

const TASK_COLUMNS: &str = "id, crop_id, task_type, target_stage, due_at, status, completed_at, created_at";

#[derive(Debug, FromRow)]
struct CropTaskRow {
    id: Uuid,
    crop_id: Uuid,
    task_type: String,
    target_stage: String,
    due_at: DateTime<Utc>,
    status: String,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CropTaskRow> for CropTask {
    type Error = AppError;

    fn try_from(row: CropTaskRow) -> AppResult<Self> {
        let status = row
            .status
            .parse::<CropTaskStatus>()
            .map_err(|_| AppError::Internal(format!("stored task status '{}' is not recognised", row.status)))?;
        Ok(CropTask {
            id: row.id,
            crop_id: row.crop_id,
            task_type: row.task_type,
            target_stage: decode(&row.target_stage)?,
            due_at: row.due_at,
            status,
            completed_at: row.completed_at,
            created_at: row.created_at,
        })
    }
}

/// Queue planned tasks; returns how many were written
pub(crate) async fn schedule(conn: &mut PgConnection, tasks: &[PlannedTask]) -> AppResult<usize> {
    for task in tasks {
        sqlx::query(
            r#"
            INSERT INTO crop_tasks (id, crop_id, task_type, target_stage, due_at, status)
            VALUES ($1, $2, $3, $4, $5, 'pending')
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.crop_id)
        .bind(&task.task_type)
        .bind(task.target_stage.code())
        .bind(task.due_at)
        .execute(&mut *conn)
        .await?;
    }
    Ok(tasks.len())
}

/// Mark pending tasks for the stages just reached as done
pub(crate) async fn complete_through_stage(
    conn: &mut PgConnection,
    crop_id: Uuid,
    reached: &[CropStage],
    at: DateTime<Utc>,
) -> AppResult<u64> {
    let codes: Vec<&str> = reached.iter().map(|s| s.code()).collect();
    let result = sqlx::query(
        r#"
        UPDATE crop_tasks SET status = 'completed', completed_at = $3
        WHERE crop_id = $1 AND status = 'pending' AND target_stage = ANY($2)
        "#,
    )
    .bind(crop_id)
    .bind(&codes)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Cancel everything still pending for a crop
pub(crate) async fn cancel_pending(conn: &mut PgConnection, crop_id: Uuid, at: DateTime<Utc>) -> AppResult<u64> {
    let result = sqlx::query(
        "UPDATE crop_tasks SET status = 'cancelled', completed_at = $2 WHERE crop_id = $1 AND status = 'pending'",
    )
    .bind(crop_id)
    .bind(at)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

impl CropTaskService {
    /// Create a new CropTaskService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Pending tasks due at or before `now`, soonest first
    pub async fn list_due(&self, now: DateTime<Utc>) -> AppResult<Vec<CropTask>> {
        let rows = sqlx::query_as::<_, CropTaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM crop_tasks WHERE status = 'pending' AND due_at <= $1 ORDER BY due_at, id"
        ))
        .bind(now)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CropTask::try_from).collect()
    }

    pub async fn list_for_crop(&self, crop_id: Uuid) -> AppResult<Vec<CropTask>> {
        let rows = sqlx::query_as::<_, CropTaskRow>(&format!(
            "SELECT {TASK_COLUMNS} FROM crop_tasks WHERE crop_id = $1 ORDER BY due_at, id"
        ))
        .bind(crop_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(CropTask::try_from).collect()
    }

    /// Mark a pending task done without moving the crop
    pub async fn complete(&self, id: Uuid) -> AppResult<CropTask> {
        let row = sqlx::query_as::<_, CropTaskRow>(&format!(
            r#"
            UPDATE crop_tasks SET status = 'completed', completed_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => {
                let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM crop_tasks WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.db)
                    .await?;
                if exists {
                    Err(AppError::InvalidStateTransition(format!("task {} is not pending", id)))
                } else {
                    Err(AppError::NotFound("Crop task".to_string()))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_status_codes() {
        for status in [CropTaskStatus::Pending, CropTaskStatus::Completed, CropTaskStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<CropTaskStatus>(), Ok(status));
        }
        assert!(matches!(
            "done".parse::<CropTaskStatus>(),
            Err(DomainError::UnknownCode { kind: "crop_task_status", .. })
        ));
    }
}

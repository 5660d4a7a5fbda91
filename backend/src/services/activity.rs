//! Activity log: who changed what, written inside the changing transaction

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Activity log service for reading recorded changes
#[derive(Clone)]
pub struct ActivityService {
    db: PgPool,
}

/// One recorded change
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ActivityLogEntry {
    pub id: Uuid,
    pub log_name: String,
    pub subject_type: String,
    pub subject_id: Uuid,
    pub event: String,
    pub description: Option<String>,
    pub properties: Value,
    pub created_at: DateTime<Utc>,
}

/// Change about to be written
#[derive(Debug, Clone)]
pub struct Activity {
    pub log_name: &'static str,
    pub subject_type: &'static str,
    pub subject_id: Uuid,
    pub event: &'static str,
    pub description: Option<String>,
    pub properties: Value,
}

impl Activity {
    pub fn new(log_name: &'static str, subject_type: &'static str, subject_id: Uuid, event: &'static str) -> Self {
        Self {
            log_name,
            subject_type,
            subject_id,
            event,
            description: None,
            properties: Value::Object(Map::new()),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn properties(mut self, properties: Value) -> Self {
        self.properties = properties;
        self
    }

    /// Attach the `old`/`attributes` diff between two snapshots
    pub fn changes<T: Serialize>(self, old: &T, new: &T) -> AppResult<Self> {
        let old = to_value(old)?;
        let new = to_value(new)?;
        Ok(self.properties(diff_attributes(&old, &new)))
    }

    /// Attach the full snapshot of a newly created record
    pub fn created<T: Serialize>(self, record: &T) -> AppResult<Self> {
        let attributes = to_value(record)?;
        Ok(self.properties(serde_json::json!({ "attributes": attributes })))
    }
}

fn to_value<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(format!("activity snapshot failed: {}", e)))
}

/// Keep only the keys whose values differ.
///
/// Returns `{"old": {...}, "attributes": {...}}`; keys missing on one side
/// show up as `null` on that side.
pub fn diff_attributes(old: &Value, new: &Value) -> Value {
    let empty = Map::new();
    let old_map = old.as_object().unwrap_or(&empty);
    let new_map = new.as_object().unwrap_or(&empty);

    let mut old_changed = Map::new();
    let mut new_changed = Map::new();

    for (key, new_value) in new_map {
        let old_value = old_map.get(key).unwrap_or(&Value::Null);
        if old_value != new_value {
            old_changed.insert(key.clone(), old_value.clone());
            new_changed.insert(key.clone(), new_value.clone());
        }
    }
    for (key, old_value) in old_map {
        if !new_map.contains_key(key) {
            old_changed.insert(key.clone(), old_value.clone());
            new_changed.insert(key.clone(), Value::Null);
        }
    }

    serde_json::json!({
        "old": Value::Object(old_changed),
        "attributes": Value::Object(new_changed),
    })
}

/// Write an activity row on the caller's connection
pub async fn record(conn: &mut PgConnection, activity: Activity) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO activity_log (id, log_name, subject_type, subject_id, event, description, properties)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(activity.log_name)
    .bind(activity.subject_type)
    .bind(activity.subject_id)
    .bind(activity.event)
    .bind(&activity.description)
    .bind(&activity.properties)
    .execute(conn)
    .await?;

    tracing::debug!(
        log_name = activity.log_name,
        subject_type = activity.subject_type,
        subject_id = %activity.subject_id,
        event = activity.event,
        "activity recorded"
    );
    Ok(())
}

impl ActivityService {
    /// Create a new ActivityService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Changes recorded against one record, newest first
    pub async fn list_for_subject(&self, subject_type: &str, subject_id: Uuid) -> AppResult<Vec<ActivityLogEntry>> {
        let entries = sqlx::query_as::<_, ActivityLogEntry>(
            r#"
            SELECT id, log_name, subject_type, subject_id, event, description, properties, created_at
            FROM activity_log
            WHERE subject_type = $1 AND subject_id = $2
            ORDER BY created_at DESC
            "#,
        )
        .bind(subject_type)
        .bind(subject_id)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }

    /// Most recent changes for a log
    pub async fn list_recent(&self, log_name: &str, limit: i64) -> AppResult<Vec<ActivityLogEntry>> {
        let entries = sqlx::query_as::<_, ActivityLogEntry>(
            r#"
            SELECT id, log_name, subject_type, subject_id, event, description, properties, created_at
            FROM activity_log
            WHERE log_name = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(log_name)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_diff_keeps_only_changed_keys() {
        let old = json!({"quantity": "10", "status": "active", "location": "rack A"});
        let new = json!({"quantity": "4", "status": "active", "location": "rack A"});
        assert_eq!(
            diff_attributes(&old, &new),
            json!({"old": {"quantity": "10"}, "attributes": {"quantity": "4"}})
        );
    }

    #[test]
    fn test_diff_handles_added_and_removed_keys() {
        let old = json!({"lot_no": "A1"});
        let new = json!({"notes": "recount"});
        let diff = diff_attributes(&old, &new);
        assert_eq!(diff["old"], json!({"lot_no": "A1", "notes": null}));
        assert_eq!(diff["attributes"], json!({"lot_no": null, "notes": "recount"}));
    }

    #[test]
    fn test_identical_snapshots_produce_empty_diff() {
        let snapshot = json!({"a": 1});
        assert_eq!(
            diff_attributes(&snapshot, &snapshot),
            json!({"old": {}, "attributes": {}})
        );
    }
}

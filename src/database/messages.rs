//! Scheduled-message persistence.

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::ScheduledMessage;

fn message_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledMessage> {
    Ok(ScheduledMessage {
        id: Uuid::parse_str(&row.get::<String, _>("id"))?,
        message: row.get("message"),
        scheduled_for: row.get("scheduled_for"),
        sent: row.get("sent"),
        sent_at: row.get("sent_at"),
        created_at: row.get("created_at"),
    })
}

impl Database {
    pub async fn create_scheduled_message(
        &self,
        message: &str,
        scheduled_for: DateTime<Utc>,
    ) -> Result<ScheduledMessage> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO scheduled_messages (id, message, scheduled_for, sent, created_at)
            VALUES (?, ?, ?, 0, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(message)
        .bind(scheduled_for)
        .bind(created_at)
        .execute(&self.pool())
        .await?;

        Ok(ScheduledMessage {
            id,
            message: message.to_string(),
            scheduled_for,
            sent: false,
            sent_at: None,
            created_at,
        })
    }

    pub async fn list_scheduled_messages(&self) -> Result<Vec<ScheduledMessage>> {
        let rows = sqlx::query(
            "SELECT id, message, scheduled_for, sent, sent_at, created_at
             FROM scheduled_messages ORDER BY scheduled_for",
        )
        .fetch_all(&self.pool())
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    pub async fn get_scheduled_message(&self, id: Uuid) -> Result<Option<ScheduledMessage>> {
        let row = sqlx::query(
            "SELECT id, message, scheduled_for, sent, sent_at, created_at
             FROM scheduled_messages WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool())
        .await?;

        row.as_ref().map(message_from_row).transpose()
    }

    pub async fn delete_scheduled_message(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM scheduled_messages WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Unsent messages whose scheduled time has passed, oldest first.
    pub async fn due_scheduled_messages(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledMessage>> {
        let rows = sqlx::query(
            "SELECT id, message, scheduled_for, sent, sent_at, created_at
             FROM scheduled_messages
             WHERE sent = 0 AND scheduled_for <= ?
             ORDER BY scheduled_for",
        )
        .bind(now)
        .fetch_all(&self.pool())
        .await?;

        rows.iter().map(message_from_row).collect()
    }

    pub async fn mark_message_sent(&self, id: Uuid, sent_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE scheduled_messages SET sent = 1, sent_at = ? WHERE id = ?")
            .bind(sent_at)
            .bind(id.to_string())
            .execute(&self.pool())
            .await?;

        Ok(())
    }
}

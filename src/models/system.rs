use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One CPU usage sample kept in the monitor's history ring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuReading {
    pub usage: f64,
    pub timestamp: DateTime<Utc>,
}

/// Static host facts reported alongside CPU usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    pub platform: String,
    pub arch: String,
    pub total_memory: u64,
    pub free_memory: u64,
    pub uptime: u64,
    pub load_average: [f64; 3],
}

/// Response body for `GET /system/cpu`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuReport {
    pub current: f64,
    pub average: f64,
    pub history: Vec<CpuReading>,
    pub system_info: SystemInfo,
    pub restart_scheduled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub message: String,
    pub scheduled_for: DateTime<Utc>,
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMessageRequest {
    pub message: Option<String>,
    pub scheduled_for: Option<String>,
}

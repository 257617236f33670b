//! Scheduled-message delivery.
//!
//! Polls the store for unsent messages whose scheduled time has passed and
//! delivers them. Delivery is currently a log line plus the sent marker;
//! the sweep is what guarantees a message fires at most once.

use anyhow::Result;
use chrono::Utc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::database::Database;

pub struct MessageScheduler {
    database: Database,
    poll_interval: Duration,
}

impl MessageScheduler {
    pub fn new(database: Database, poll_interval_secs: u64) -> Self {
        Self {
            database,
            poll_interval: Duration::from_secs(poll_interval_secs),
        }
    }

    /// Delivery loop; run on its own task.
    pub async fn start(self) {
        let mut ticker = interval(self.poll_interval);
        loop {
            ticker.tick().await;
            if let Err(e) = self.deliver_due().await {
                error!("Scheduled message sweep failed: {}", e);
            }
        }
    }

    /// Deliver every message that is due right now.
    pub async fn deliver_due(&self) -> Result<usize> {
        let now = Utc::now();
        let due = self.database.due_scheduled_messages(now).await?;
        let delivered = due.len();

        for message in due {
            info!(
                "Sending scheduled message {} (due {}): {}",
                message.id, message.scheduled_for, message.message
            );
            self.database.mark_message_sent(message.id, now).await?;
        }

        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::memory_database;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn sweep_delivers_each_due_message_exactly_once() {
        let database = memory_database().await;
        let now = Utc::now();
        database
            .create_scheduled_message("renewal reminder", now - ChronoDuration::seconds(1))
            .await
            .unwrap();
        database
            .create_scheduled_message("later", now + ChronoDuration::hours(1))
            .await
            .unwrap();

        let scheduler = MessageScheduler::new(database.clone(), 60);
        assert_eq!(scheduler.deliver_due().await.unwrap(), 1);
        // Second sweep finds nothing: the message is marked sent
        assert_eq!(scheduler.deliver_due().await.unwrap(), 0);
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub mod system;
pub mod views;

pub use system::*;
pub use views::*;

/// The entity kinds materialized by the ingestion pipeline.
///
/// Each kind is upserted by a business-meaningful natural key; the summary
/// counters in a job result are keyed by these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Agent,
    User,
    Account,
    LineOfBusiness,
    Carrier,
    Policy,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub first_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub phone: String,
    pub state: String,
    pub zip: String,
    pub email: String,
    pub gender: String,
    pub user_type: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub account_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LineOfBusiness {
    pub id: Uuid,
    pub category_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Carrier {
    pub id: Uuid,
    pub company_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Policy {
    pub id: Uuid,
    pub policy_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lob_id: Option<Uuid>,
    pub carrier_id: Option<Uuid>,
    pub user_id: Uuid,
    pub account_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field set written when upserting a User by email.
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpsert {
    pub first_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub phone: String,
    pub state: String,
    pub zip: String,
    pub email: String,
    pub gender: String,
    pub user_type: String,
}

/// Field set written when upserting a Policy by policy number.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyUpsert {
    pub policy_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub lob_id: Option<Uuid>,
    pub carrier_id: Option<Uuid>,
    pub user_id: Uuid,
    pub account_id: Option<Uuid>,
}

/// Per-kind upsert counters accumulated over one ingestion job.
///
/// Counters count upsert operations in file order, not distinct entities:
/// two rows naming the same carrier increment `carriers` twice while the
/// store still holds a single record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub agents: u64,
    pub users: u64,
    pub accounts: u64,
    pub lobs: u64,
    pub carriers: u64,
    pub policies: u64,
    pub errors: u64,
}

impl JobSummary {
    pub fn record(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Agent => self.agents += 1,
            EntityKind::User => self.users += 1,
            EntityKind::Account => self.accounts += 1,
            EntityKind::LineOfBusiness => self.lobs += 1,
            EntityKind::Carrier => self.carriers += 1,
            EntityKind::Policy => self.policies += 1,
        }
    }

    pub fn record_error(&mut self) {
        self.errors += 1;
    }
}

/// Terminal message of a successful ingestion job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub records_processed: u64,
    pub summary: JobSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub row_errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_records_each_kind_under_its_own_counter() {
        let mut summary = JobSummary::default();
        summary.record(EntityKind::Agent);
        summary.record(EntityKind::User);
        summary.record(EntityKind::User);
        summary.record(EntityKind::Policy);
        summary.record_error();

        assert_eq!(summary.agents, 1);
        assert_eq!(summary.users, 2);
        assert_eq!(summary.policies, 1);
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.accounts, 0);
    }

    #[test]
    fn job_result_omits_empty_row_errors() {
        let result = JobResult {
            records_processed: 2,
            summary: JobSummary::default(),
            row_errors: Vec::new(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("rowErrors").is_none());
        assert_eq!(json["recordsProcessed"], 2);

        let result = JobResult {
            row_errors: vec!["Row 1: boom".to_string()],
            ..result
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["rowErrors"][0], "Row 1: boom");
    }
}

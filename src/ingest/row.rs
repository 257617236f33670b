//! Per-row entity resolution.
//!
//! Each row runs through a fixed, ordered pipeline of resolution steps.
//! The order matters: the Policy step looks up entities that earlier steps
//! (in this row or an earlier one) may have just written, so parents are
//! always materialized before children.

use anyhow::Result;
use tracing::debug;

use super::fields::parse_date;
use super::reader::RowRecord;
use crate::database::Database;
use crate::models::{EntityKind, PolicyUpsert, UserUpsert};

pub const COL_AGENT: &str = "Agent";
pub const COL_FIRST_NAME: &str = "First Name";
pub const COL_EMAIL: &str = "Email";
pub const COL_DOB: &str = "DOB";
pub const COL_ADDRESS: &str = "Address";
pub const COL_PHONE: &str = "Phone";
pub const COL_STATE: &str = "State";
pub const COL_ZIP: &str = "Zip";
pub const COL_GENDER: &str = "Gender";
pub const COL_USER_TYPE: &str = "User Type";
pub const COL_ACCOUNT_NAME: &str = "Account Name";
pub const COL_CATEGORY: &str = "Category";
pub const COL_CARRIER: &str = "Carrier";
pub const COL_POLICY_NUMBER: &str = "Policy Number";
pub const COL_START_DATE: &str = "Start Date";
pub const COL_END_DATE: &str = "End Date";

/// One stage of the per-row pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionStep {
    Agent,
    User,
    Account,
    LineOfBusiness,
    Carrier,
    Policy,
}

/// The order rows are resolved in. Policy must come last: it only looks up
/// what the earlier steps upserted.
pub const RESOLUTION_ORDER: [ResolutionStep; 6] = [
    ResolutionStep::Agent,
    ResolutionStep::User,
    ResolutionStep::Account,
    ResolutionStep::LineOfBusiness,
    ResolutionStep::Carrier,
    ResolutionStep::Policy,
];

/// Outcome of processing a single row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The row applied; lists the entity kinds upserted for it.
    Applied(Vec<EntityKind>),
    /// Something in the row failed; only this row is affected.
    Failed(String),
}

pub struct RowProcessor<'a> {
    database: &'a Database,
}

impl<'a> RowProcessor<'a> {
    pub fn new(database: &'a Database) -> Self {
        Self { database }
    }

    pub async fn process(&self, row: &RowRecord) -> RowOutcome {
        match self.resolve(row).await {
            Ok(touched) => RowOutcome::Applied(touched),
            Err(e) => RowOutcome::Failed(e.to_string()),
        }
    }

    async fn resolve(&self, row: &RowRecord) -> Result<Vec<EntityKind>> {
        let mut touched = Vec::new();
        for step in RESOLUTION_ORDER {
            if let Some(kind) = self.run_step(step, row).await? {
                touched.push(kind);
            }
        }
        Ok(touched)
    }

    async fn run_step(&self, step: ResolutionStep, row: &RowRecord) -> Result<Option<EntityKind>> {
        match step {
            ResolutionStep::Agent => self.resolve_agent(row).await,
            ResolutionStep::User => self.resolve_user(row).await,
            ResolutionStep::Account => self.resolve_account(row).await,
            ResolutionStep::LineOfBusiness => self.resolve_line_of_business(row).await,
            ResolutionStep::Carrier => self.resolve_carrier(row).await,
            ResolutionStep::Policy => self.resolve_policy(row).await,
        }
    }

    async fn resolve_agent(&self, row: &RowRecord) -> Result<Option<EntityKind>> {
        let Some(name) = row.non_blank(COL_AGENT) else {
            return Ok(None);
        };
        self.database.upsert_agent(name).await?;
        Ok(Some(EntityKind::Agent))
    }

    async fn resolve_user(&self, row: &RowRecord) -> Result<Option<EntityKind>> {
        let (Some(first_name), Some(email)) =
            (row.non_blank(COL_FIRST_NAME), row.non_blank(COL_EMAIL))
        else {
            return Ok(None);
        };

        let user = UserUpsert {
            first_name: first_name.to_string(),
            date_of_birth: row.get(COL_DOB).and_then(parse_date),
            address: trimmed_or_empty(row, COL_ADDRESS),
            phone: trimmed_or_empty(row, COL_PHONE),
            state: trimmed_or_empty(row, COL_STATE),
            zip: trimmed_or_empty(row, COL_ZIP),
            email: email.to_string(),
            gender: trimmed_or_empty(row, COL_GENDER),
            user_type: row
                .non_blank(COL_USER_TYPE)
                .unwrap_or("Customer")
                .to_string(),
        };
        self.database.upsert_user(&user).await?;
        Ok(Some(EntityKind::User))
    }

    async fn resolve_account(&self, row: &RowRecord) -> Result<Option<EntityKind>> {
        let Some(account_name) = row.non_blank(COL_ACCOUNT_NAME) else {
            return Ok(None);
        };
        self.database.upsert_account(account_name).await?;
        Ok(Some(EntityKind::Account))
    }

    async fn resolve_line_of_business(&self, row: &RowRecord) -> Result<Option<EntityKind>> {
        let Some(category) = row.non_blank(COL_CATEGORY) else {
            return Ok(None);
        };
        self.database.upsert_line_of_business(category).await?;
        Ok(Some(EntityKind::LineOfBusiness))
    }

    async fn resolve_carrier(&self, row: &RowRecord) -> Result<Option<EntityKind>> {
        let Some(company) = row.non_blank(COL_CARRIER) else {
            return Ok(None);
        };
        self.database.upsert_carrier(company).await?;
        Ok(Some(EntityKind::Carrier))
    }

    async fn resolve_policy(&self, row: &RowRecord) -> Result<Option<EntityKind>> {
        // The policy step needs a non-blank policy number plus first-name and
        // email fields present in the record.
        let (Some(policy_number), Some(_), Some(email)) = (
            row.non_blank(COL_POLICY_NUMBER),
            row.get(COL_FIRST_NAME),
            row.get(COL_EMAIL),
        ) else {
            return Ok(None);
        };

        // Policies are only written for a resolvable owner. An unknown user
        // skips the row's policy without recording an error.
        let Some(user_id) = self.database.find_user_by_email(email.trim()).await? else {
            debug!(
                "skipping policy {}: no user with email {:?}",
                policy_number, email
            );
            return Ok(None);
        };

        let account_id = match row.non_blank(COL_ACCOUNT_NAME) {
            Some(name) => self.database.find_account_by_name(name).await?,
            None => None,
        };
        let lob_id = match row.non_blank(COL_CATEGORY) {
            Some(category) => {
                self.database
                    .find_line_of_business_by_category(category)
                    .await?
            }
            None => None,
        };
        let carrier_id = match row.non_blank(COL_CARRIER) {
            Some(company) => self.database.find_carrier_by_company(company).await?,
            None => None,
        };

        let policy = PolicyUpsert {
            policy_number: policy_number.to_string(),
            start_date: row.get(COL_START_DATE).and_then(parse_date),
            end_date: row.get(COL_END_DATE).and_then(parse_date),
            lob_id,
            carrier_id,
            user_id,
            account_id,
        };
        self.database.upsert_policy(&policy).await?;
        Ok(Some(EntityKind::Policy))
    }
}

fn trimmed_or_empty(row: &RowRecord, header: &str) -> String {
    row.non_blank(header).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_support::memory_database;
    use chrono::NaiveDate;
    use sqlx::Row as _;

    fn full_row() -> RowRecord {
        RowRecord::from_pairs([
            (COL_AGENT, "Smith"),
            (COL_FIRST_NAME, "Jo"),
            (COL_EMAIL, "jo@x.com"),
            (COL_DOB, "03/15/1990"),
            (COL_ADDRESS, "1 Elm St"),
            (COL_PHONE, "555-0100"),
            (COL_STATE, "NY"),
            (COL_ZIP, "10001"),
            (COL_GENDER, "F"),
            (COL_USER_TYPE, ""),
            (COL_ACCOUNT_NAME, "Household"),
            (COL_CATEGORY, "Auto"),
            (COL_CARRIER, "Acme Mutual"),
            (COL_POLICY_NUMBER, "POL100"),
            (COL_START_DATE, "2024-01-01"),
            (COL_END_DATE, "2025-01-01"),
        ])
    }

    #[test]
    fn policy_is_the_last_resolution_step() {
        assert_eq!(RESOLUTION_ORDER[0], ResolutionStep::Agent);
        assert_eq!(RESOLUTION_ORDER[1], ResolutionStep::User);
        assert_eq!(
            RESOLUTION_ORDER.last().copied(),
            Some(ResolutionStep::Policy)
        );
        assert_eq!(RESOLUTION_ORDER.len(), 6);
    }

    #[tokio::test]
    async fn full_row_touches_every_entity_kind() {
        let db = memory_database().await;
        let processor = RowProcessor::new(&db);

        let outcome = processor.process(&full_row()).await;
        let RowOutcome::Applied(touched) = outcome else {
            panic!("row should apply");
        };
        assert_eq!(
            touched,
            vec![
                EntityKind::Agent,
                EntityKind::User,
                EntityKind::Account,
                EntityKind::LineOfBusiness,
                EntityKind::Carrier,
                EntityKind::Policy,
            ]
        );

        // The blank User Type column fell back to the default
        let user_type: String = sqlx::query("SELECT user_type FROM users WHERE email = 'jo@x.com'")
            .fetch_one(&db.pool())
            .await
            .unwrap()
            .get("user_type");
        assert_eq!(user_type, "Customer");
    }

    #[tokio::test]
    async fn policy_with_unknown_user_is_silently_skipped() {
        let db = memory_database().await;
        let processor = RowProcessor::new(&db);

        // The blank first name keeps the User step from materializing an
        // owner, so the policy's user lookup comes up empty.
        let row = RowRecord::from_pairs([
            (COL_POLICY_NUMBER, "POL100"),
            (COL_FIRST_NAME, ""),
            (COL_EMAIL, "missing@x.com"),
        ]);

        let outcome = processor.process(&row).await;
        assert_eq!(outcome, RowOutcome::Applied(vec![]));

        let policies: i64 = sqlx::query("SELECT COUNT(*) AS n FROM policies")
            .fetch_one(&db.pool())
            .await
            .unwrap()
            .get("n");
        assert_eq!(policies, 0);

        // A row carrying its own resolvable user gets its policy written
        let row = RowRecord::from_pairs([
            (COL_POLICY_NUMBER, "POL200"),
            (COL_FIRST_NAME, "X"),
            (COL_EMAIL, "x@x.com"),
        ]);
        let outcome = processor.process(&row).await;
        let RowOutcome::Applied(touched) = outcome else {
            panic!("row should apply");
        };
        assert!(touched.contains(&EntityKind::User));
        assert!(touched.contains(&EntityKind::Policy));
    }

    #[tokio::test]
    async fn blank_optional_references_store_as_null() {
        let db = memory_database().await;
        let processor = RowProcessor::new(&db);

        let row = RowRecord::from_pairs([
            (COL_FIRST_NAME, "Jo"),
            (COL_EMAIL, "jo@x.com"),
            (COL_POLICY_NUMBER, "POL300"),
            (COL_CARRIER, ""),
            (COL_START_DATE, "03/15/2024"),
        ]);
        let outcome = processor.process(&row).await;
        assert!(matches!(outcome, RowOutcome::Applied(_)));

        let row = sqlx::query(
            "SELECT carrier_id, account_id, lob_id, start_date FROM policies
             WHERE policy_number = 'POL300'",
        )
        .fetch_one(&db.pool())
        .await
        .unwrap();
        assert!(row.get::<Option<String>, _>("carrier_id").is_none());
        assert!(row.get::<Option<String>, _>("account_id").is_none());
        assert!(row.get::<Option<String>, _>("lob_id").is_none());
        assert_eq!(
            row.get::<Option<NaiveDate>, _>("start_date"),
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }
}

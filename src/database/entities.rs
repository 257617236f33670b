//! Natural-key entity resolution for the ingestion pipeline.
//!
//! One upsert per entity kind, keyed by the kind's natural key: insert when
//! the key is unseen, otherwise overwrite the tracked fields (last-write-wins,
//! no per-field merge). The returned id is the surviving record's id either
//! way. The `find_*` lookups never create records; Policy resolution uses
//! them so an unresolved optional reference degrades to NULL instead of
//! spawning a placeholder row.

use anyhow::Result;
use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::{PolicyUpsert, UserUpsert};

impl Database {
    pub async fn upsert_agent(&self, name: &str) -> Result<Uuid> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO agents (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(name)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool())
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    pub async fn upsert_user(&self, user: &UserUpsert) -> Result<Uuid> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO users
                (id, first_name, date_of_birth, address, phone, state, zip,
                 email, gender, user_type, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(email) DO UPDATE SET
                first_name = excluded.first_name,
                date_of_birth = excluded.date_of_birth,
                address = excluded.address,
                phone = excluded.phone,
                state = excluded.state,
                zip = excluded.zip,
                gender = excluded.gender,
                user_type = excluded.user_type,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&user.first_name)
        .bind(user.date_of_birth)
        .bind(&user.address)
        .bind(&user.phone)
        .bind(&user.state)
        .bind(&user.zip)
        .bind(&user.email)
        .bind(&user.gender)
        .bind(&user.user_type)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool())
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    pub async fn upsert_account(&self, account_name: &str) -> Result<Uuid> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO accounts (id, account_name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(account_name) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_name)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool())
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    pub async fn upsert_line_of_business(&self, category_name: &str) -> Result<Uuid> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO lines_of_business (id, category_name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(category_name) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(category_name)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool())
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    pub async fn upsert_carrier(&self, company_name: &str) -> Result<Uuid> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO carriers (id, company_name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(company_name) DO UPDATE SET updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(company_name)
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool())
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    pub async fn upsert_policy(&self, policy: &PolicyUpsert) -> Result<Uuid> {
        let id: String = sqlx::query_scalar(
            r#"
            INSERT INTO policies
                (id, policy_number, start_date, end_date, lob_id, carrier_id,
                 user_id, account_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(policy_number) DO UPDATE SET
                start_date = excluded.start_date,
                end_date = excluded.end_date,
                lob_id = excluded.lob_id,
                carrier_id = excluded.carrier_id,
                user_id = excluded.user_id,
                account_id = excluded.account_id,
                updated_at = excluded.updated_at
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&policy.policy_number)
        .bind(policy.start_date)
        .bind(policy.end_date)
        .bind(policy.lob_id.map(|id| id.to_string()))
        .bind(policy.carrier_id.map(|id| id.to_string()))
        .bind(policy.user_id.to_string())
        .bind(policy.account_id.map(|id| id.to_string()))
        .bind(Utc::now())
        .bind(Utc::now())
        .fetch_one(&self.pool())
        .await?;

        Ok(Uuid::parse_str(&id)?)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<Uuid>> {
        self.find_id("SELECT id FROM users WHERE email = ?", email)
            .await
    }

    pub async fn find_account_by_name(&self, account_name: &str) -> Result<Option<Uuid>> {
        self.find_id("SELECT id FROM accounts WHERE account_name = ?", account_name)
            .await
    }

    pub async fn find_line_of_business_by_category(
        &self,
        category_name: &str,
    ) -> Result<Option<Uuid>> {
        self.find_id(
            "SELECT id FROM lines_of_business WHERE category_name = ?",
            category_name,
        )
        .await
    }

    pub async fn find_carrier_by_company(&self, company_name: &str) -> Result<Option<Uuid>> {
        self.find_id("SELECT id FROM carriers WHERE company_name = ?", company_name)
            .await
    }

    async fn find_id(&self, query: &str, key: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool())
            .await?;

        match row {
            Some(row) => Ok(Some(Uuid::parse_str(&row.get::<String, _>("id"))?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_support::memory_database;
    use crate::models::{PolicyUpsert, UserUpsert};
    use chrono::NaiveDate;

    fn sample_user(email: &str) -> UserUpsert {
        UserUpsert {
            first_name: "Dana".to_string(),
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2),
            address: "12 Main St".to_string(),
            phone: "555-0100".to_string(),
            state: "CA".to_string(),
            zip: "90210".to_string(),
            email: email.to_string(),
            gender: "F".to_string(),
            user_type: "Customer".to_string(),
        }
    }

    #[tokio::test]
    async fn upsert_user_is_idempotent_by_email() {
        let db = memory_database().await;

        let first = db.upsert_user(&sample_user("dana@example.com")).await.unwrap();
        let second = db.upsert_user(&sample_user("dana@example.com")).await.unwrap();
        assert_eq!(first, second);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn upsert_user_overwrites_fields_last_write_wins() {
        let db = memory_database().await;

        db.upsert_user(&sample_user("dana@example.com")).await.unwrap();

        let mut updated = sample_user("dana@example.com");
        updated.first_name = "Dana-Renamed".to_string();
        updated.phone = "555-0199".to_string();
        db.upsert_user(&updated).await.unwrap();

        let (first_name, phone): (String, String) =
            sqlx::query_as("SELECT first_name, phone FROM users WHERE email = ?")
                .bind("dana@example.com")
                .fetch_one(&db.pool())
                .await
                .unwrap();
        assert_eq!(first_name, "Dana-Renamed");
        assert_eq!(phone, "555-0199");
    }

    #[tokio::test]
    async fn lookups_never_create_records() {
        let db = memory_database().await;

        assert!(db.find_carrier_by_company("Acme Mutual").await.unwrap().is_none());

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carriers")
            .fetch_one(&db.pool())
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn upsert_policy_keeps_one_record_per_policy_number() {
        let db = memory_database().await;
        let user_id = db.upsert_user(&sample_user("dana@example.com")).await.unwrap();
        let carrier_id = db.upsert_carrier("Acme Mutual").await.unwrap();

        let policy = PolicyUpsert {
            policy_number: "POL100".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 3, 15),
            end_date: NaiveDate::from_ymd_opt(2025, 3, 15),
            lob_id: None,
            carrier_id: Some(carrier_id),
            user_id,
            account_id: None,
        };
        let first = db.upsert_policy(&policy).await.unwrap();

        let rewritten = PolicyUpsert {
            carrier_id: None,
            ..policy
        };
        let second = db.upsert_policy(&rewritten).await.unwrap();
        assert_eq!(first, second);

        let (count, carrier): (i64, Option<String>) = sqlx::query_as(
            "SELECT COUNT(*), carrier_id FROM policies WHERE policy_number = 'POL100'",
        )
        .fetch_one(&db.pool())
        .await
        .unwrap();
        assert_eq!(count, 1);
        assert!(carrier.is_none());
    }
}

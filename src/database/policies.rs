//! Read queries behind the policy endpoints.

use anyhow::Result;
use sqlx::Row;
use uuid::Uuid;

use super::Database;
use crate::models::{
    PolicyListItem, PolicyRefView, PolicyUserView, UserPolicyAggregate, UserSummary,
};

fn policy_ref_from_row(row: &sqlx::sqlite::SqliteRow) -> PolicyRefView {
    PolicyRefView {
        policy_number: row.get("policy_number"),
        start_date: row.get("start_date"),
        end_date: row.get("end_date"),
        category: row.get("category"),
        carrier: row.get("carrier"),
        account: row.get("account"),
    }
}

impl Database {
    pub async fn count_policies(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM policies")
            .fetch_one(&self.pool())
            .await?)
    }

    pub async fn list_policies(&self, page: u32, limit: u32) -> Result<Vec<PolicyListItem>> {
        let offset = (page.saturating_sub(1) as i64) * limit as i64;
        let rows = sqlx::query(
            r#"
            SELECT p.policy_number, p.start_date, p.end_date,
                   l.category_name AS category,
                   c.company_name AS carrier,
                   a.account_name AS account,
                   u.first_name AS user_first_name,
                   u.email AS user_email
            FROM policies p
            JOIN users u ON u.id = p.user_id
            LEFT JOIN lines_of_business l ON l.id = p.lob_id
            LEFT JOIN carriers c ON c.id = p.carrier_id
            LEFT JOIN accounts a ON a.id = p.account_id
            ORDER BY p.start_date DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit as i64)
        .bind(offset)
        .fetch_all(&self.pool())
        .await?;

        Ok(rows
            .iter()
            .map(|row| PolicyListItem {
                policy: policy_ref_from_row(row),
                user: PolicyUserView {
                    first_name: row.get("user_first_name"),
                    email: row.get("user_email"),
                },
            })
            .collect())
    }

    /// First user whose first name contains the pattern, case-insensitively.
    pub async fn find_user_by_first_name(&self, pattern: &str) -> Result<Option<UserSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, first_name, email, phone
            FROM users
            WHERE first_name LIKE '%' || ? || '%' COLLATE NOCASE
            ORDER BY first_name
            LIMIT 1
            "#,
        )
        .bind(pattern)
        .fetch_optional(&self.pool())
        .await?;

        match row {
            Some(row) => Ok(Some(UserSummary {
                id: Uuid::parse_str(&row.get::<String, _>("id"))?,
                first_name: row.get("first_name"),
                email: row.get("email"),
                phone: row.get("phone"),
            })),
            None => Ok(None),
        }
    }

    pub async fn policies_for_user(&self, user_id: Uuid) -> Result<Vec<PolicyRefView>> {
        let rows = sqlx::query(
            r#"
            SELECT p.policy_number, p.start_date, p.end_date,
                   l.category_name AS category,
                   c.company_name AS carrier,
                   a.account_name AS account
            FROM policies p
            LEFT JOIN lines_of_business l ON l.id = p.lob_id
            LEFT JOIN carriers c ON c.id = p.carrier_id
            LEFT JOIN accounts a ON a.id = p.account_id
            WHERE p.user_id = ?
            ORDER BY p.start_date DESC
            "#,
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool())
        .await?;

        Ok(rows.iter().map(policy_ref_from_row).collect())
    }

    /// Policies grouped per owning user, sorted by first name.
    pub async fn aggregate_policies_by_user(&self) -> Result<Vec<UserPolicyAggregate>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id AS user_id, u.first_name, u.email,
                   p.policy_number, p.start_date, p.end_date,
                   l.category_name AS category,
                   c.company_name AS carrier,
                   a.account_name AS account
            FROM policies p
            JOIN users u ON u.id = p.user_id
            LEFT JOIN lines_of_business l ON l.id = p.lob_id
            LEFT JOIN carriers c ON c.id = p.carrier_id
            LEFT JOIN accounts a ON a.id = p.account_id
            ORDER BY u.first_name, u.id, p.start_date DESC
            "#,
        )
        .fetch_all(&self.pool())
        .await?;

        let mut aggregates: Vec<UserPolicyAggregate> = Vec::new();
        for row in &rows {
            let user_id = Uuid::parse_str(&row.get::<String, _>("user_id"))?;
            let policy = policy_ref_from_row(row);

            if let Some(last) = aggregates.last_mut() {
                if last.user_id == user_id {
                    last.total_policies += 1;
                    last.policies.push(policy);
                    continue;
                }
            }
            aggregates.push(UserPolicyAggregate {
                user_id,
                first_name: row.get("first_name"),
                email: row.get("email"),
                total_policies: 1,
                policies: vec![policy],
            });
        }

        Ok(aggregates)
    }
}

#[cfg(test)]
mod tests {
    use crate::database::test_support::memory_database;
    use crate::models::{PolicyUpsert, UserUpsert};
    use chrono::NaiveDate;

    fn user(first_name: &str, email: &str) -> UserUpsert {
        UserUpsert {
            first_name: first_name.to_string(),
            date_of_birth: None,
            address: String::new(),
            phone: "555-0100".to_string(),
            state: String::new(),
            zip: String::new(),
            email: email.to_string(),
            gender: String::new(),
            user_type: "Customer".to_string(),
        }
    }

    #[tokio::test]
    async fn search_matches_first_name_case_insensitively() {
        let db = memory_database().await;
        db.upsert_user(&user("Miriam", "miriam@example.com")).await.unwrap();

        let found = db.find_user_by_first_name("miri").await.unwrap().unwrap();
        assert_eq!(found.email, "miriam@example.com");

        assert!(db.find_user_by_first_name("zoe").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn aggregate_groups_policies_per_user() {
        let db = memory_database().await;
        let alice = db.upsert_user(&user("Alice", "alice@example.com")).await.unwrap();
        let bob = db.upsert_user(&user("Bob", "bob@example.com")).await.unwrap();
        let carrier = db.upsert_carrier("Acme Mutual").await.unwrap();

        for (number, owner) in [("P1", alice), ("P2", alice), ("P3", bob)] {
            db.upsert_policy(&PolicyUpsert {
                policy_number: number.to_string(),
                start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
                end_date: None,
                lob_id: None,
                carrier_id: Some(carrier),
                user_id: owner,
                account_id: None,
            })
            .await
            .unwrap();
        }

        let aggregates = db.aggregate_policies_by_user().await.unwrap();
        assert_eq!(aggregates.len(), 2);
        assert_eq!(aggregates[0].first_name, "Alice");
        assert_eq!(aggregates[0].total_policies, 2);
        assert_eq!(aggregates[1].total_policies, 1);
        assert_eq!(aggregates[1].policies[0].carrier.as_deref(), Some("Acme Mutual"));
        // A policy with no account link renders as absent, not an error
        assert!(aggregates[0].policies[0].account.is_none());
    }

    #[tokio::test]
    async fn list_policies_paginates_in_start_date_order() {
        let db = memory_database().await;
        let alice = db.upsert_user(&user("Alice", "alice@example.com")).await.unwrap();

        for (number, year) in [("P1", 2022), ("P2", 2024), ("P3", 2023)] {
            db.upsert_policy(&PolicyUpsert {
                policy_number: number.to_string(),
                start_date: NaiveDate::from_ymd_opt(year, 1, 1),
                end_date: None,
                lob_id: None,
                carrier_id: None,
                user_id: alice,
                account_id: None,
            })
            .await
            .unwrap();
        }

        let page = db.list_policies(1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].policy.policy_number, "P2");
        assert_eq!(page[1].policy.policy_number, "P3");

        let page = db.list_policies(2, 2).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].policy.policy_number, "P1");
        assert_eq!(db.count_policies().await.unwrap(), 3);
    }
}

//! Read-side shapes for the policy endpoints.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One policy with its joined reference names; optional references render
/// as `null` when the policy stored no link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRefView {
    pub policy_number: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub category: Option<String>,
    pub carrier: Option<String>,
    pub account: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyListItem {
    #[serde(flatten)]
    pub policy: PolicyRefView,
    pub user: PolicyUserView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyUserView {
    pub first_name: String,
    pub email: String,
}

/// Slim user record returned by the search endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub email: String,
    pub phone: String,
}

/// One user's grouped policies for the aggregation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPolicyAggregate {
    pub user_id: Uuid,
    pub first_name: String,
    pub email: String,
    pub total_policies: u64,
    pub policies: Vec<PolicyRefView>,
}

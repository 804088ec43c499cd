use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::auth::dto::UserProjection;

#[derive(Debug, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub data: UserProjection,
}

#[derive(Debug, Serialize)]
pub struct StatusUpdateResponse {
    pub success: bool,
    pub data: UserProjection,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub success: bool,
    pub data: DashboardData,
}

/// Aggregate dashboard figures. User counts come from the store; revenue,
/// transaction and ticket figures are the product's mock placeholders.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub total_revenue: f64,
    pub new_users: i64,
    pub transactions: i64,
    pub support_tickets: i64,
    pub total_users: i64,
    pub active_users: i64,
    pub verified_users: i64,
    pub recent_transactions: Vec<TransactionSummary>,
}

#[derive(Debug, Serialize)]
pub struct TransactionSummary {
    pub id: &'static str,
    pub user: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub amount: f64,
    pub status: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub data: Vec<UserProjection>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current_page: i64,
    pub total_pages: i64,
    pub total_users: i64,
    pub has_next: bool,
    pub has_prev: bool,
}

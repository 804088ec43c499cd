use axum::{
    extract::{Path, Query, State},
    Json,
};
use uuid::Uuid;
use time::{OffsetDateTime, Time};
use tracing::{info, instrument};

use crate::{
    auth::{jwt::AuthUser, repo_types::User},
    error::ApiError,
    state::AppState,
};

use super::dto::{
    DashboardData, DashboardResponse, PageQuery, Pagination, StatusUpdateRequest,
    StatusUpdateResponse, TransactionSummary, UserListResponse, UserResponse,
};
use crate::auth::dto::MessageResponse;

fn start_of_month(now: OffsetDateTime) -> anyhow::Result<OffsetDateTime> {
    Ok(now.replace_day(1)?.replace_time(Time::MIDNIGHT))
}

// Any authenticated session may read these for now; a role check belongs
// here once roles exist.
#[instrument(skip(state))]
pub async fn dashboard(
    State(state): State<AppState>,
    AuthUser(_admin_id): AuthUser,
) -> Result<Json<DashboardResponse>, ApiError> {
    let now = OffsetDateTime::now_utc();

    let total_users = User::count_all(&state.db).await?;
    let new_users = User::count_created_since(&state.db, start_of_month(now)?).await?;
    let active_users = User::count_active(&state.db).await?;
    let verified_users = User::count_verified(&state.db).await?;

    // Mock figures for the parts of the product with no backing data yet.
    let data = DashboardData {
        total_revenue: 12_345.67,
        new_users,
        transactions: 12,
        support_tickets: 3,
        total_users,
        active_users,
        verified_users,
        recent_transactions: vec![
            TransactionSummary {
                id: "TXN001",
                user: "John Doe",
                kind: "deposit",
                amount: 500.00,
                status: "completed",
                date: now,
            },
            TransactionSummary {
                id: "TXN002",
                user: "Jane Smith",
                kind: "withdrawal",
                amount: -200.00,
                status: "pending",
                date: now,
            },
        ],
    };

    Ok(Json(DashboardResponse {
        success: true,
        data,
    }))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_admin_id): AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<UserListResponse>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);
    let offset = (page - 1) * limit;

    let users = User::list_page(&state.db, limit, offset).await?;
    let total_users = User::count_all(&state.db).await?;
    let total_pages = (total_users + limit - 1) / limit;

    Ok(Json(UserListResponse {
        success: true,
        data: users.iter().map(Into::into).collect(),
        pagination: Pagination {
            current_page: page,
            total_pages,
            total_users,
            has_next: page < total_pages,
            has_prev: page > 1,
        },
    }))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_admin_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = User::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(UserResponse {
        success: true,
        data: (&user).into(),
    }))
}

#[instrument(skip(state, payload))]
pub async fn update_user_status(
    State(state): State<AppState>,
    AuthUser(_admin_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<StatusUpdateResponse>, ApiError> {
    let user = User::set_active(&state.db, id, payload.is_active)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let message = if payload.is_active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };
    info!(user_id = %id, is_active = payload.is_active, "user status updated");

    Ok(Json(StatusUpdateResponse {
        success: true,
        data: (&user).into(),
        message: message.into(),
    }))
}

/// The only path that hard-deletes a user record.
#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_admin_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !User::delete(&state.db, id).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }

    info!(user_id = %id, "user deleted");
    Ok(Json(MessageResponse::ok("User deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn start_of_month_resets_day_and_time() {
        let now = datetime!(2026-08-29 17:42:05 UTC);
        assert_eq!(start_of_month(now).unwrap(), datetime!(2026-08-01 0:00 UTC));
    }

    #[test]
    fn transaction_summary_serializes_type_field() {
        let txn = TransactionSummary {
            id: "TXN001",
            user: "John Doe",
            kind: "deposit",
            amount: 500.0,
            status: "completed",
            date: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&txn).unwrap();
        assert!(json.contains("\"type\":\"deposit\""));
    }
}

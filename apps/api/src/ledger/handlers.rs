use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::affordability::{check_affordability, Affordability};
use crate::errors::AppError;
use crate::ledger::{GrantReceipt, UsageSnapshot};
use crate::principal::Principal;
use crate::state::AppState;
use crate::tiers::{Operation, Tier};

/// GET /api/v1/limits
///
/// Read-only balance for the calling principal. Rolls the period over
/// first if it has lapsed, so the numbers are always current.
pub async fn handle_get_limits(
    State(state): State<AppState>,
    principal: Principal,
) -> Result<Json<UsageSnapshot>, AppError> {
    let snapshot = state
        .ledger
        .status(&principal)
        .await
        .map_err(|e| AppError::from_ledger(e, &principal))?;
    Ok(Json(snapshot))
}

/// GET /api/v1/affordability/:operation
pub async fn handle_check_affordability(
    State(state): State<AppState>,
    principal: Principal,
    Path(operation): Path<Operation>,
) -> Result<Json<Affordability>, AppError> {
    let snapshot = state
        .ledger
        .status(&principal)
        .await
        .map_err(|e| AppError::from_ledger(e, &principal))?;
    Ok(Json(check_affordability(operation, snapshot)))
}

#[derive(Deserialize)]
pub struct RecordUsageRequest {
    pub operation: Operation,
}

/// POST /api/v1/usage
///
/// Called by flows after their paid work succeeded. Debits the
/// operation's cost and returns the post-debit balance; an exhausted
/// balance rejects with the snapshot embedded.
pub async fn handle_record_usage(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<RecordUsageRequest>,
) -> Result<Json<UsageSnapshot>, AppError> {
    let snapshot = state
        .ledger
        .record_usage(&principal, req.operation)
        .await
        .map_err(|e| AppError::from_ledger(e, &principal))?;
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
pub struct GrantCreditsRequest {
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_key: String,
}

/// POST /api/v1/credits
///
/// Billing webhook target. The affected user comes from the body, not
/// from request headers; the transaction key makes redelivery harmless.
pub async fn handle_grant_credits(
    State(state): State<AppState>,
    Json(req): Json<GrantCreditsRequest>,
) -> Result<Json<GrantReceipt>, AppError> {
    if req.amount <= 0 {
        return Err(AppError::Validation(
            "amount must be a positive number of credits".to_string(),
        ));
    }
    if req.transaction_key.trim().is_empty() {
        return Err(AppError::Validation(
            "transaction_key must not be empty".to_string(),
        ));
    }

    let principal = Principal::User(req.user_id);
    let receipt = state
        .ledger
        .add_bonus_credits(&principal, req.amount, req.transaction_key.trim())
        .await
        .map_err(|e| AppError::from_ledger(e, &principal))?;
    Ok(Json(receipt))
}

#[derive(Deserialize)]
pub struct SubscriptionUpdateRequest {
    pub user_id: Uuid,
    pub tier: String,
}

/// POST /api/v1/subscription
///
/// Billing webhook target. Unknown tier names degrade to FREE; setting
/// the tier the user already has changes nothing, so redelivery cannot
/// wipe a period in progress.
pub async fn handle_subscription_update(
    State(state): State<AppState>,
    Json(req): Json<SubscriptionUpdateRequest>,
) -> Result<Json<UsageSnapshot>, AppError> {
    let principal = Principal::User(req.user_id);
    let tier = Tier::from_name(&req.tier);
    let snapshot = state
        .ledger
        .set_tier(&principal, tier)
        .await
        .map_err(|e| AppError::from_ledger(e, &principal))?;
    Ok(Json(snapshot))
}

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::affordability::check_affordability;
use crate::cache::hashing;
use crate::errors::AppError;
use crate::ledger::UsageSnapshot;
use crate::principal::Principal;
use crate::roast::{prompts, RoastReport};
use crate::state::AppState;
use crate::tiers::Operation;

#[derive(Deserialize)]
pub struct RoastRequest {
    pub resume_text: String,
    pub job_context: Option<String>,
    #[serde(default)]
    pub bypass_cache: bool,
}

#[derive(Serialize)]
pub struct RoastResponse {
    pub report: RoastReport,
    pub cached: bool,
    pub usage: UsageSnapshot,
}

/// POST /api/v1/roast
///
/// Affordability is checked before the model runs and the debit happens
/// only after it succeeds, so a failed model call never costs credits.
/// Cache hits skip both the model and the debit.
pub async fn handle_roast(
    State(state): State<AppState>,
    principal: Principal,
    Json(req): Json<RoastRequest>,
) -> Result<Json<RoastResponse>, AppError> {
    if req.resume_text.trim().is_empty() {
        return Err(AppError::Validation(
            "resume_text must not be empty".to_string(),
        ));
    }

    let snapshot = state
        .ledger
        .status(&principal)
        .await
        .map_err(|e| AppError::from_ledger(e, &principal))?;
    let verdict = check_affordability(Operation::FullAnalysis, snapshot);
    if !verdict.can_afford {
        return Err(AppError::QuotaExceeded {
            snapshot: Box::new(verdict.snapshot),
            anonymous: principal.is_anonymous(),
        });
    }

    let key = hashing::content_key("roast", &req.resume_text, req.job_context.as_deref());
    let llm = state.llm.clone();
    let prompt = prompts::roast_prompt(&req.resume_text, req.job_context.as_deref());
    let system = prompts::roast_system();

    let result = state
        .cache
        .get_or_compute(&key, req.bypass_cache, move || async move {
            llm.call_json::<RoastReport>(&prompt, &system)
                .await
                .map_err(AppError::from)
        })
        .await?;

    let usage = if result.cached {
        state.ledger.status(&principal).await
    } else {
        state
            .ledger
            .record_usage(&principal, Operation::FullAnalysis)
            .await
    }
    .map_err(|e| AppError::from_ledger(e, &principal))?;

    Ok(Json(RoastResponse {
        report: result.value,
        cached: result.cached,
        usage,
    }))
}

pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::ledger::handlers as ledger_handlers;
use crate::roast::handlers as roast_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Usage ledger
        .route("/api/v1/limits", get(ledger_handlers::handle_get_limits))
        .route(
            "/api/v1/affordability/:operation",
            get(ledger_handlers::handle_check_affordability),
        )
        .route("/api/v1/usage", post(ledger_handlers::handle_record_usage))
        // Billing webhooks
        .route("/api/v1/credits", post(ledger_handlers::handle_grant_credits))
        .route(
            "/api/v1/subscription",
            post(ledger_handlers::handle_subscription_update),
        )
        // Gated roast flow
        .route("/api/v1/roast", post(roast_handlers::handle_roast))
        .with_state(state)
}

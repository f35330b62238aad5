use std::sync::Arc;

use crate::cache::CacheGate;
use crate::ledger::UsageLedger;
use crate::llm_client::LlmClient;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Credit accounting. Routes authenticated users to Postgres and
    /// anonymous fingerprints to the in-process store.
    pub ledger: Arc<UsageLedger>,
    pub cache: Arc<CacheGate>,
    pub llm: LlmClient,
}

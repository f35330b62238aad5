//! The roast flow: the credit-gated, cache-fronted resume analysis this
//! service runs end to end. Other paid operations (cover letters, resume
//! optimization) live in sibling services and only report usage here.

pub mod handlers;
pub mod prompts;

use serde::{Deserialize, Serialize};

/// Structured verdict as the model returns it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoastReport {
    pub overall_score: u8,
    pub summary: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<String>,
}

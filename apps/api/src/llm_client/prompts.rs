// Cross-cutting prompt fragments. Each flow that calls the model keeps
// its own prompts.rs next to its handlers; only shared fragments live here.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Instruction keeping feedback anchored to the submitted text.
pub const GROUNDED_FEEDBACK: &str = "\
    CRITICAL: Every observation must point at something actually present in \
    (or absent from) the submitted resume. Do NOT invent employers, dates, \
    titles, or skills. If the resume does not support a claim, do not make it.";

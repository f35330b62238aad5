//! Prompt construction for the roast flow.

use crate::llm_client::prompts::{GROUNDED_FEEDBACK, JSON_ONLY_SYSTEM};

pub fn roast_system() -> String {
    format!(
        "{JSON_ONLY_SYSTEM} {GROUNDED_FEEDBACK} \
         You are a blunt but constructive resume reviewer. You point out \
         exactly what would make a hiring manager stop reading, and you \
         always pair criticism with a concrete fix."
    )
}

pub fn roast_prompt(resume_text: &str, job_context: Option<&str>) -> String {
    let job_section = match job_context {
        Some(job) => format!(
            "\n\nTarget role / job description:\n{job}\n\n\
             Weigh fit against this role where relevant."
        ),
        None => String::new(),
    };

    format!(
        r#"Review the resume below. Return JSON with this exact shape:
{{
  "overall_score": <integer 0-100>,
  "summary": "<two or three sentences, direct tone>",
  "strengths": ["<specific strength>", ...],
  "weaknesses": ["<specific weakness>", ...],
  "suggestions": ["<concrete, actionable fix>", ...]
}}

Resume:
{resume_text}{job_section}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_includes_job_context_only_when_present() {
        let bare = roast_prompt("resume body", None);
        assert!(!bare.contains("Target role"));

        let targeted = roast_prompt("resume body", Some("Backend engineer, fintech"));
        assert!(targeted.contains("Target role"));
        assert!(targeted.contains("Backend engineer, fintech"));
    }
}

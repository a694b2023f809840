//! Prompt text shared by every provider.

use std::sync::LazyLock;

use scholarscout_shared::{Currency, ScholarshipCategory, StudyLevel};

/// System instructions. Enumerated values come straight from the domain enums
/// so the prompt and the validator never disagree.
pub(crate) static SYSTEM_PROMPT: LazyLock<String> = LazyLock::new(|| {
    format!(
        r#"You are a research assistant that finds currently open scholarships for international students.

Search the web and return ONLY a JSON array inside a ```json fenced block. Each element must have exactly these fields:

- "title": official scholarship name
- "organization": the awarding university, government or foundation
- "country": host country
- "level": one of {levels}
- "field": field of study, or "Any"
- "category": one of {categories}
- "deadline": next application deadline as YYYY-MM-DD; it must be in the future
- "description": two or three sentences on eligibility and what the award covers
- "link": the official application or programme page on the awarding body's own website
- "amount": award value as text, or null if unknown
- "currency": one of {currencies}, or null

Rules:
- Never link to aggregators, social media, blogs or PDF files.
- Skip scholarships whose deadline has passed or is unknown.
- If nothing qualifies, return an empty array []."#,
        levels = quoted(StudyLevel::ALL.iter().map(|v| v.as_str())),
        categories = quoted(ScholarshipCategory::ALL.iter().map(|v| v.as_str())),
        currencies = quoted(Currency::ALL.iter().map(|v| v.as_str())),
    )
});

/// User message for one search query.
pub(crate) fn user_prompt(query: &str) -> String {
    format!("Find scholarships matching: {query}")
}

fn quoted<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values
        .map(|v| format!("\"{v}\""))
        .collect::<Vec<_>>()
        .join(", ")
}

//! Candidate validation for untrusted provider output.
//!
//! Model output is treated as hostile input. [`CandidateValidator`] pulls a
//! JSON array out of the raw text, then runs every element through three
//! gates in order:
//!
//! 1. schema: types, enum membership, URL shape, `YYYY-MM-DD` deadline
//! 2. trust: [`policy::is_trusted_link`] and the substantive-text floors
//! 3. deadline window: not in the past, not beyond the configured horizon
//!
//! A failing element is dropped on its own; the rest of the batch continues.
//! Unparseable output yields an empty report, never an error.

mod extract;
pub mod policy;

use std::sync::LazyLock;

use chrono::{Months, NaiveDate};
use regex::Regex;
use scholarscout_shared::{Candidate, ValidatedCandidate, ValidationConfig};
use serde_json::Value;
use tracing::{debug, info, warn};
use url::Url;

pub use policy::{is_substantive, is_trusted_link};

/// Matches the `YYYY-MM-DD` deadline format.
static DEADLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("deadline regex"));

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

/// Why a single element was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectionReason {
    /// Field types, enum membership, URL or date format.
    Schema(String),
    /// Link fails the trust policy.
    UntrustedLink(String),
    /// A text field is below its length floor.
    ThinContent(&'static str),
    /// Deadline outside the accepted window.
    Deadline(DeadlineIssue),
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Schema(msg) => write!(f, "schema violation: {msg}"),
            Self::UntrustedLink(link) => write!(f, "untrusted link: {link}"),
            Self::ThinContent(field) => write!(f, "{field} is too short to trust"),
            Self::Deadline(issue) => write!(f, "deadline rejected: {issue}"),
        }
    }
}

/// Deadline window failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeadlineIssue {
    /// Matches the format but is not a calendar date (e.g. `2027-02-30`).
    Unparseable(String),
    /// Strictly before today.
    Past(NaiveDate),
    /// After today plus the horizon.
    TooFar(NaiveDate),
}

impl std::fmt::Display for DeadlineIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unparseable(raw) => write!(f, "`{raw}` is not a calendar date"),
            Self::Past(date) => write!(f, "{date} has already passed"),
            Self::TooFar(date) => write!(f, "{date} is implausibly far in the future"),
        }
    }
}

/// A dropped element, kept for observability.
#[derive(Debug, Clone)]
pub struct Rejection {
    /// Position in the extracted array.
    pub index: usize,
    /// The element's title, when it had a string one.
    pub title: Option<String>,
    pub reason: RejectionReason,
}

/// Outcome of validating one provider response.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// Number of array elements extracted from the text.
    pub extracted: usize,
    pub accepted: Vec<ValidatedCandidate>,
    pub rejected: Vec<Rejection>,
    /// Set when the text held no usable JSON array.
    pub parse_error: Option<String>,
}

impl ValidationReport {
    /// A report with nothing in it, used when a query fails upstream.
    pub fn empty() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Shared, provider-agnostic validator.
#[derive(Debug, Clone, Copy)]
pub struct CandidateValidator {
    max_deadline_months: u32,
}

impl Default for CandidateValidator {
    fn default() -> Self {
        Self::new(&ValidationConfig::default())
    }
}

impl CandidateValidator {
    pub fn new(config: &ValidationConfig) -> Self {
        Self {
            max_deadline_months: config.max_deadline_months,
        }
    }

    /// Validate a raw provider response against `today`.
    pub fn validate_response(&self, text: &str, today: NaiveDate) -> ValidationReport {
        let items = match extract::parse_array(text) {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "provider output held no JSON array, treating as empty");
                return ValidationReport {
                    parse_error: Some(e),
                    ..ValidationReport::default()
                };
            }
        };

        let mut report = ValidationReport {
            extracted: items.len(),
            ..ValidationReport::default()
        };

        for (index, value) in items.into_iter().enumerate() {
            let title = value
                .get("title")
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string());

            match self.validate_value(value, today) {
                Ok(candidate) => report.accepted.push(candidate),
                Err(reason) => {
                    debug!(index, title = ?title, %reason, "candidate rejected");
                    report.rejected.push(Rejection {
                        index,
                        title,
                        reason,
                    });
                }
            }
        }

        info!(
            extracted = report.extracted,
            accepted = report.accepted.len(),
            rejected = report.rejected.len(),
            "validated provider output"
        );

        report
    }

    /// Run one JSON element through schema, trust and deadline gates.
    pub fn validate_value(
        &self,
        value: Value,
        today: NaiveDate,
    ) -> Result<ValidatedCandidate, RejectionReason> {
        let candidate: Candidate = serde_json::from_value(value)
            .map_err(|e| RejectionReason::Schema(e.to_string()))?;

        check_schema(&candidate)?;

        if !is_trusted_link(&candidate.link) {
            return Err(RejectionReason::UntrustedLink(candidate.link));
        }

        if let Some(field) = policy::thin_field(
            &candidate.title,
            &candidate.organization,
            &candidate.description,
        ) {
            return Err(RejectionReason::ThinContent(field));
        }

        let deadline = check_deadline(candidate.deadline.trim(), today, self.max_deadline_months)
            .map_err(RejectionReason::Deadline)?;

        Ok(ValidatedCandidate {
            title: candidate.title.trim().to_string(),
            organization: candidate.organization.trim().to_string(),
            country: candidate.country.trim().to_string(),
            level: candidate.level,
            field: candidate.field.trim().to_string(),
            category: candidate.category,
            deadline,
            description: candidate.description.trim().to_string(),
            link: candidate.link.trim().to_string(),
            amount: candidate.amount,
            currency: candidate.currency,
        })
    }
}

/// Checks serde cannot express: non-empty strings, URL and date shape.
fn check_schema(candidate: &Candidate) -> Result<(), RejectionReason> {
    let required = [
        ("title", &candidate.title),
        ("organization", &candidate.organization),
        ("country", &candidate.country),
        ("field", &candidate.field),
        ("deadline", &candidate.deadline),
        ("description", &candidate.description),
        ("link", &candidate.link),
    ];
    if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
        return Err(RejectionReason::Schema(format!("field `{name}` is empty")));
    }

    Url::parse(candidate.link.trim())
        .map_err(|e| RejectionReason::Schema(format!("link is not a valid URL: {e}")))?;

    if !DEADLINE_RE.is_match(candidate.deadline.trim()) {
        return Err(RejectionReason::Schema(format!(
            "deadline `{}` is not YYYY-MM-DD",
            candidate.deadline
        )));
    }

    Ok(())
}

/// Parse `raw` and check it falls in `[today, today + max_months]`.
pub fn check_deadline(
    raw: &str,
    today: NaiveDate,
    max_months: u32,
) -> Result<NaiveDate, DeadlineIssue> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| DeadlineIssue::Unparseable(raw.to_string()))?;

    if date < today {
        return Err(DeadlineIssue::Past(date));
    }

    let horizon = today
        .checked_add_months(Months::new(max_months))
        .unwrap_or(NaiveDate::MAX);
    if date > horizon {
        return Err(DeadlineIssue::TooFar(date));
    }

    Ok(date)
}

//! Core domain types for scholarship ingestion.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Closed enums
// ---------------------------------------------------------------------------

/// Implements `as_str`, `ALL`, `Display` and `FromStr` for a closed enum whose
/// serde names match its stored names.
macro_rules! closed_enum {
    ($ty:ident { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            /// Canonical name, as stored and as shown to providers.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.pad(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .copied()
                    .ok_or_else(|| format!("unknown {} `{s}`", stringify!($ty)))
            }
        }
    };
}

/// Academic level a scholarship targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StudyLevel {
    Bachelor,
    Master,
    #[serde(rename = "PhD")]
    PhD,
    Postdoctoral,
    Any,
}

closed_enum!(StudyLevel {
    Bachelor => "Bachelor",
    Master => "Master",
    PhD => "PhD",
    Postdoctoral => "Postdoctoral",
    Any => "Any",
});

/// Funding category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScholarshipCategory {
    #[serde(rename = "Fully Funded")]
    FullyFunded,
    #[serde(rename = "Partial Funding")]
    PartialFunding,
    #[serde(rename = "Tuition Waiver")]
    TuitionWaiver,
    #[serde(rename = "Research Grant")]
    ResearchGrant,
    Fellowship,
    #[serde(rename = "Exchange Program")]
    ExchangeProgram,
    #[serde(rename = "Merit-Based")]
    MeritBased,
    #[serde(rename = "Need-Based")]
    NeedBased,
}

closed_enum!(ScholarshipCategory {
    FullyFunded => "Fully Funded",
    PartialFunding => "Partial Funding",
    TuitionWaiver => "Tuition Waiver",
    ResearchGrant => "Research Grant",
    Fellowship => "Fellowship",
    ExchangeProgram => "Exchange Program",
    MeritBased => "Merit-Based",
    NeedBased => "Need-Based",
});

/// ISO currency of the award amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
    Jpy,
    Cny,
    Inr,
    Chf,
    Sek,
    Nok,
    Dkk,
    Nzd,
    Sgd,
    Krw,
    Zar,
    Brl,
    #[serde(rename = "Other")]
    Other,
}

closed_enum!(Currency {
    Usd => "USD",
    Eur => "EUR",
    Gbp => "GBP",
    Cad => "CAD",
    Aud => "AUD",
    Jpy => "JPY",
    Cny => "CNY",
    Inr => "INR",
    Chf => "CHF",
    Sek => "SEK",
    Nok => "NOK",
    Dkk => "DKK",
    Nzd => "NZD",
    Sgd => "SGD",
    Krw => "KRW",
    Zar => "ZAR",
    Brl => "BRL",
    Other => "Other",
});

/// Upstream search provider family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Perplexity,
    OpenAi,
    Anthropic,
}

closed_enum!(ProviderKind {
    Perplexity => "perplexity",
    OpenAi => "openai",
    Anthropic => "anthropic",
});

// ---------------------------------------------------------------------------
// Candidates
// ---------------------------------------------------------------------------

/// Unvalidated scholarship as emitted by a provider.
///
/// Deserializing into this type is the schema check: missing required fields,
/// wrong types and unknown enum values all fail here.
#[derive(Debug, Clone, Deserialize)]
pub struct Candidate {
    pub title: String,
    pub organization: String,
    pub country: String,
    pub level: StudyLevel,
    pub field: String,
    pub category: ScholarshipCategory,
    pub deadline: String,
    pub description: String,
    pub link: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub amount: Option<String>,
    #[serde(default)]
    pub currency: Option<Currency>,
}

/// Accept `"€10,000"`, `10000` or `null` for free-text amounts.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Option::<Amount>::deserialize(deserializer)? {
        Some(Amount::Text(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Amount::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// A candidate that passed schema, trust and deadline checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedCandidate {
    pub title: String,
    pub organization: String,
    pub country: String,
    pub level: StudyLevel,
    pub field: String,
    pub category: ScholarshipCategory,
    pub deadline: NaiveDate,
    pub description: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
}

impl ValidatedCandidate {
    /// Normalized `(title, organization)` key used for deduplication.
    pub fn identity_key(&self) -> String {
        identity_key(&self.title, &self.organization)
    }
}

/// A validated candidate whose link answered a liveness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifiedCandidate {
    pub candidate: ValidatedCandidate,
    /// Final HTTP status that counted as alive.
    pub http_status: u16,
    pub checked_at: DateTime<Utc>,
}

/// Build the identity key for a title/organization pair.
///
/// Lowercased and trimmed; the unit separator keeps `("a b", "c")` and
/// `("a", "b c")` apart.
pub fn identity_key(title: &str, organization: &str) -> String {
    format!(
        "{}\u{1f}{}",
        title.trim().to_lowercase(),
        organization.trim().to_lowercase()
    )
}

// ---------------------------------------------------------------------------
// Persisted entities
// ---------------------------------------------------------------------------

/// A scholarship row in the persisted corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScholarshipRecord {
    /// UUID v7.
    pub id: String,
    pub identity_key: String,
    pub title: String,
    pub organization: String,
    pub country: String,
    pub level: StudyLevel,
    pub field: String,
    pub category: ScholarshipCategory,
    pub deadline: NaiveDate,
    pub description: String,
    pub link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<Currency>,
    /// Set only by an administrator who checked the listing by hand.
    pub human_verified: bool,
    /// Provider and run that first produced the record.
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lifecycle state of a fetch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

closed_enum!(RunStatus {
    Running => "running",
    Completed => "completed",
    Failed => "failed",
});

impl RunStatus {
    /// Completed and failed runs never change again.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// One pipeline execution in the run log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRun {
    pub id: String,
    pub queries: Vec<String>,
    pub status: RunStatus,
    pub found: u32,
    pub added: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_deserializes_with_numeric_amount() {
        let json = r#"{
            "title": "Global Excellence Scholarship",
            "organization": "University of Example",
            "country": "Netherlands",
            "level": "Master",
            "field": "Any",
            "category": "Merit-Based",
            "deadline": "2027-02-01",
            "description": "Covers tuition.",
            "link": "https://www.uva.nl/apply",
            "amount": 25000,
            "currency": "EUR"
        }"#;
        let candidate: Candidate = serde_json::from_str(json).expect("deserialize");
        assert_eq!(candidate.level, StudyLevel::Master);
        assert_eq!(candidate.category, ScholarshipCategory::MeritBased);
        assert_eq!(candidate.amount.as_deref(), Some("25000"));
        assert_eq!(candidate.currency, Some(Currency::Eur));
    }

    #[test]
    fn candidate_rejects_unknown_category() {
        let json = r#"{
            "title": "t", "organization": "o", "country": "c", "level": "PhD",
            "field": "f", "category": "Lottery", "deadline": "2027-01-01",
            "description": "d", "link": "https://mit.edu"
        }"#;
        let err = serde_json::from_str::<Candidate>(json).unwrap_err();
        assert!(err.to_string().contains("unknown variant"));
    }

    #[test]
    fn candidate_rejects_level_synonyms() {
        for level in ["Masters", "Bachelors", "Doctoral", "Postdoc", "Undergraduate"] {
            let json = format!(
                r#"{{
                    "title": "t", "organization": "o", "country": "c", "level": "{level}",
                    "field": "f", "category": "Fully Funded", "deadline": "2027-01-01",
                    "description": "d", "link": "https://mit.edu"
                }}"#
            );
            assert!(serde_json::from_str::<Candidate>(&json).is_err(), "{level} accepted");
        }
    }

    #[test]
    fn enum_names_roundtrip_through_from_str() {
        for level in StudyLevel::ALL {
            assert_eq!(level.as_str().parse::<StudyLevel>().unwrap(), *level);
        }
        for category in ScholarshipCategory::ALL {
            assert_eq!(
                category.as_str().parse::<ScholarshipCategory>().unwrap(),
                *category
            );
        }
        assert_eq!(ScholarshipCategory::ALL.len(), 8);
        assert_eq!(Currency::ALL.len(), 18);
        assert_eq!("completed".parse::<RunStatus>().unwrap(), RunStatus::Completed);
        assert!("paused".parse::<RunStatus>().is_err());
    }

    #[test]
    fn identity_key_is_case_and_whitespace_insensitive() {
        assert_eq!(
            identity_key("  Fulbright Program ", "U.S. Department of State"),
            identity_key("fulbright program", "u.s. department of state  ")
        );
        assert_ne!(identity_key("a b", "c"), identity_key("a", "b c"));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }
}

//! Regional query batches, rotated one batch per fetch cycle.

use chrono::{Datelike, NaiveDate};
use scholarscout_shared::QueriesConfig;

/// Placeholder replaced with the upcoming intake year.
const YEAR_PLACEHOLDER: &str = "{year}";

const EUROPE: &[&str] = &[
    "fully funded master's scholarships in Europe for international students {year}",
    "PhD scholarships and doctoral positions in Germany, the Netherlands and Scandinavia {year}",
    "UK government and university scholarships for international postgraduates {year}",
    "Erasmus Mundus joint master scholarships {year}",
];

const NORTH_AMERICA: &[&str] = &[
    "fully funded graduate fellowships at US universities for international students {year}",
    "Canadian university and government scholarships for international students {year}",
    "funded PhD programmes in the United States and Canada {year}",
    "undergraduate merit scholarships for international applicants in North America {year}",
];

const ASIA_PACIFIC: &[&str] = &[
    "government scholarships in Japan, South Korea and China for international students {year}",
    "Australian and New Zealand university scholarships for international students {year}",
    "Singapore and Hong Kong graduate scholarships {year}",
    "research scholarships in Asia for master's and PhD students {year}",
];

const AFRICA_MIDDLE_EAST_LATAM: &[&str] = &[
    "scholarships for African students to study abroad {year}",
    "fully funded scholarships at universities in the Middle East and Gulf states {year}",
    "Latin American government and university scholarships for international students {year}",
    "postdoctoral fellowships open to researchers from developing countries {year}",
];

/// Round-robin over query batches.
#[derive(Debug, Clone)]
pub struct QueryRotation {
    batches: Vec<Vec<String>>,
}

impl Default for QueryRotation {
    fn default() -> Self {
        let batches = [EUROPE, NORTH_AMERICA, ASIA_PACIFIC, AFRICA_MIDDLE_EAST_LATAM]
            .iter()
            .map(|batch| batch.iter().map(|q| q.to_string()).collect())
            .collect();
        Self { batches }
    }
}

impl QueryRotation {
    /// Rotation over `batches`. Empty batches are dropped; if nothing is left
    /// the built-in regional batches are used.
    pub fn new(batches: Vec<Vec<String>>) -> Self {
        let batches: Vec<Vec<String>> = batches.into_iter().filter(|b| !b.is_empty()).collect();
        if batches.is_empty() {
            Self::default()
        } else {
            Self { batches }
        }
    }

    pub fn from_config(config: &QueriesConfig) -> Self {
        Self::new(config.batches.clone())
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Queries for the cycle numbered `counter` (1-based).
    pub fn batch_for(&self, counter: u64, today: NaiveDate) -> Vec<String> {
        let index = (counter.saturating_sub(1) % self.batches.len() as u64) as usize;
        let year = intake_year(today).to_string();
        self.batches[index]
            .iter()
            .map(|q| q.replace(YEAR_PLACEHOLDER, &year))
            .collect()
    }
}

/// Academic year applicants are currently applying for.
///
/// Applications open roughly a year ahead of the autumn intake, so the intake
/// is next calendar year.
pub fn intake_year(today: NaiveDate) -> i32 {
    today.year() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 16).unwrap()
    }

    #[test]
    fn rotates_through_default_regions() {
        let rotation = QueryRotation::default();
        assert_eq!(rotation.len(), 4);

        let first = rotation.batch_for(1, today());
        assert!(first[0].contains("Europe"));
        assert!(rotation.batch_for(2, today())[0].contains("US universities"));
        assert_eq!(rotation.batch_for(5, today()), first);
    }

    #[test]
    fn substitutes_intake_year() {
        let batch = QueryRotation::default().batch_for(1, today());
        assert!(batch.iter().all(|q| q.ends_with("2027")));
        assert!(batch.iter().all(|q| !q.contains('{')));
    }

    #[test]
    fn counter_zero_is_first_batch() {
        let rotation = QueryRotation::default();
        assert_eq!(rotation.batch_for(0, today()), rotation.batch_for(1, today()));
    }

    #[test]
    fn custom_batches_replace_defaults() {
        let rotation = QueryRotation::new(vec![
            vec!["nursing scholarships {year}".into()],
            vec![],
            vec!["law LLM scholarships".into()],
        ]);
        assert_eq!(rotation.len(), 2);
        assert_eq!(rotation.batch_for(1, today()), vec!["nursing scholarships 2027"]);
        assert_eq!(rotation.batch_for(2, today()), vec!["law LLM scholarships"]);
    }

    #[test]
    fn empty_config_falls_back_to_defaults() {
        let rotation = QueryRotation::from_config(&QueriesConfig::default());
        assert_eq!(rotation.len(), 4);
    }
}

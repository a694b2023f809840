//! Link liveness verification with a bounded concurrency window.
//!
//! Candidates are probed in windows of `concurrency` links; a window must
//! finish before the next starts, so at most `concurrency` requests are ever
//! in flight. Output keeps input order.

mod probe;

use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use scholarscout_shared::{Result, ValidatedCandidate, VerificationConfig, VerifiedCandidate};
use tracing::{debug, info, instrument};

pub use probe::{HttpProbe, LinkProbe, LinkStatus};

/// Result of verifying a set of candidates.
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    /// Candidates whose link answered, in input order.
    pub verified: Vec<VerifiedCandidate>,
    /// Links that failed, with the reason.
    pub dead: Vec<(String, LinkStatus)>,
}

/// Checks that candidate links resolve before anything is stored.
pub struct LinkVerifier<P = HttpProbe> {
    probe: P,
    window: usize,
}

impl LinkVerifier<HttpProbe> {
    /// HTTP verifier using the configured timeout and window size.
    pub fn new(config: &VerificationConfig) -> Result<Self> {
        let probe = HttpProbe::new(Duration::from_secs(config.timeout_secs))?;
        Ok(Self::with_probe(probe, config.concurrency))
    }
}

impl<P: LinkProbe> LinkVerifier<P> {
    /// Verifier over an arbitrary probe. A window of 0 is treated as 1.
    pub fn with_probe(probe: P, window: usize) -> Self {
        Self {
            probe,
            window: window.max(1),
        }
    }

    /// Probe every candidate link, keeping the ones that are alive.
    #[instrument(skip_all, fields(candidates = candidates.len(), window = self.window))]
    pub async fn verify(&self, candidates: Vec<ValidatedCandidate>) -> VerificationOutcome {
        let mut outcome = VerificationOutcome::default();

        for chunk in candidates.chunks(self.window) {
            let statuses = join_all(chunk.iter().map(|c| self.probe.probe(&c.link))).await;

            for (candidate, status) in chunk.iter().zip(statuses) {
                match status {
                    LinkStatus::Alive(code) => outcome.verified.push(VerifiedCandidate {
                        candidate: candidate.clone(),
                        http_status: code,
                        checked_at: Utc::now(),
                    }),
                    other => {
                        debug!(link = %candidate.link, status = %other, "dropping dead link");
                        outcome.dead.push((candidate.link.clone(), other));
                    }
                }
            }
        }

        info!(
            verified = outcome.verified.len(),
            dead = outcome.dead.len(),
            "link verification finished"
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use scholarscout_shared::{ScholarshipCategory, StudyLevel};

    use super::*;

    /// Probe that records how many calls overlap.
    #[derive(Default)]
    struct CountingProbe {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LinkProbe for CountingProbe {
        async fn probe(&self, url: &str) -> LinkStatus {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if url.contains("dead") {
                LinkStatus::Dead(404)
            } else {
                LinkStatus::Alive(200)
            }
        }
    }

    fn candidate(n: usize, link: &str) -> ValidatedCandidate {
        ValidatedCandidate {
            title: format!("Graduate Scholarship {n}"),
            organization: "University of Toronto".into(),
            country: "Canada".into(),
            level: StudyLevel::Master,
            field: "Any".into(),
            category: ScholarshipCategory::MeritBased,
            deadline: NaiveDate::from_ymd_opt(2027, 1, 15).unwrap(),
            description: "Merit award for incoming international graduate students.".into(),
            link: link.into(),
            amount: None,
            currency: None,
        }
    }

    #[tokio::test]
    async fn never_exceeds_window() {
        let verifier = LinkVerifier::with_probe(CountingProbe::default(), 5);
        let candidates = (0..12)
            .map(|n| candidate(n, &format!("https://utoronto.ca/s/{n}")))
            .collect();

        let outcome = verifier.verify(candidates).await;
        assert_eq!(outcome.verified.len(), 12);
        assert_eq!(verifier.probe.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn keeps_input_order_and_splits_dead_links() {
        let verifier = LinkVerifier::with_probe(CountingProbe::default(), 2);
        let candidates = vec![
            candidate(0, "https://utoronto.ca/a"),
            candidate(1, "https://utoronto.ca/dead"),
            candidate(2, "https://utoronto.ca/b"),
            candidate(3, "https://utoronto.ca/c"),
        ];

        let outcome = verifier.verify(candidates).await;
        let titles: Vec<_> = outcome
            .verified
            .iter()
            .map(|v| v.candidate.title.as_str())
            .collect();
        assert_eq!(
            titles,
            [
                "Graduate Scholarship 0",
                "Graduate Scholarship 2",
                "Graduate Scholarship 3"
            ]
        );
        assert_eq!(outcome.verified[0].http_status, 200);
        assert_eq!(
            outcome.dead,
            vec![("https://utoronto.ca/dead".to_string(), LinkStatus::Dead(404))]
        );
    }

    #[tokio::test]
    async fn empty_input() {
        let verifier = LinkVerifier::with_probe(CountingProbe::default(), 0);
        let outcome = verifier.verify(Vec::new()).await;
        assert!(outcome.verified.is_empty());
        assert!(outcome.dead.is_empty());
    }
}

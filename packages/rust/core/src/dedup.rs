//! Merge verified candidates into the stored corpus.
//!
//! A candidate matches a stored record when their identity keys (lowercased,
//! trimmed title and organization) are equal. Matches only ever improve a
//! record: a later deadline or a longer description.

use scholarscout_shared::{Result, ScholarshipRecord, ValidatedCandidate, VerifiedCandidate};
use scholarscout_storage::{InsertOutcome, RecordPatch, RecordStore};
use scholarscout_validation::is_trusted_link;
use tracing::{debug, info, instrument};

/// Counts from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeResult {
    pub added: usize,
    pub updated: usize,
    pub duplicates: usize,
}

/// Insert new candidates and improve existing records.
///
/// Writes happen one at a time in input order. A uniqueness conflict on
/// insert (a concurrent writer got there first) counts as a duplicate.
#[instrument(skip_all, fields(incoming = incoming.len(), source = %source))]
pub async fn merge(
    incoming: &[VerifiedCandidate],
    store: &dyn RecordStore,
    source: &str,
) -> Result<MergeResult> {
    let mut result = MergeResult::default();

    for verified in incoming {
        let candidate = &verified.candidate;
        let key = candidate.identity_key();

        match store.find_by_identity(&key).await? {
            None => match store.insert_record(candidate, source).await? {
                InsertOutcome::Inserted(id) => {
                    debug!(%id, title = %candidate.title, "added");
                    result.added += 1;
                }
                InsertOutcome::Conflict => {
                    debug!(title = %candidate.title, "insert conflict, counting as duplicate");
                    result.duplicates += 1;
                }
            },
            Some(existing) => match plan_update(&existing, candidate) {
                Some(patch) => {
                    store.update_record(&existing.id, &patch).await?;
                    debug!(id = %existing.id, title = %candidate.title, "updated");
                    result.updated += 1;
                }
                None => result.duplicates += 1,
            },
        }
    }

    info!(
        added = result.added,
        updated = result.updated,
        duplicates = result.duplicates,
        "merge complete"
    );
    Ok(result)
}

/// Decide what to change on `existing`, if anything.
///
/// Returns `None` unless the incoming deadline is strictly later or the
/// incoming description is strictly longer (in characters). When an update
/// qualifies, the link and amount/currency ride along if they differ.
pub fn plan_update(
    existing: &ScholarshipRecord,
    incoming: &ValidatedCandidate,
) -> Option<RecordPatch> {
    let later = incoming.deadline > existing.deadline;
    let longer = incoming.description.chars().count() > existing.description.chars().count();
    if !later && !longer {
        return None;
    }

    let mut patch = RecordPatch::default();
    if later {
        patch.deadline = Some(incoming.deadline);
    }
    if longer {
        patch.description = Some(incoming.description.clone());
    }
    // The link already answered a liveness probe this cycle.
    if incoming.link != existing.link && is_trusted_link(&incoming.link) {
        patch.link = Some(incoming.link.clone());
    }
    if incoming.amount.is_some() && incoming.amount != existing.amount {
        patch.amount = incoming.amount.clone();
    }
    if incoming.currency.is_some() && incoming.currency != existing.currency {
        patch.currency = incoming.currency;
    }
    Some(patch)
}

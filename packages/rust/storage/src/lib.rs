//! libSQL storage for the scholarship corpus and the fetch run log.
//!
//! The pipeline only sees the [`RecordStore`] and [`RunLog`] traits; the CLI
//! also uses the reporting and admin queries on [`Storage`] directly.
//!
//! **Access rules:**
//! - `scholarscout fetch` and admin commands: read-write via [`Storage::open`]
//! - reporting commands: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, Row, params};
use scholarscout_shared::{
    Currency, FetchRun, Result, RunStatus, ScholarScoutError, ScholarshipCategory,
    ScholarshipRecord, StudyLevel, ValidatedCandidate,
};
use scholarscout_validation::is_trusted_link;
use tracing::{debug, warn};
use uuid::Uuid;

/// Counter that drives query batch rotation.
const FETCH_CYCLE_COUNTER: &str = "fetch_cycle";

// ---------------------------------------------------------------------------
// Boundary traits
// ---------------------------------------------------------------------------

/// Result of inserting a scholarship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(String),
    /// A record with the same identity key already exists.
    Conflict,
}

/// Fields to change on an existing record. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPatch {
    pub deadline: Option<NaiveDate>,
    pub description: Option<String>,
    pub link: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<Currency>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Persistence of scholarship records, as seen by the deduplicator.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn find_by_identity(&self, identity_key: &str) -> Result<Option<ScholarshipRecord>>;

    /// Insert a new record with `human_verified = false`.
    async fn insert_record(
        &self,
        candidate: &ValidatedCandidate,
        source: &str,
    ) -> Result<InsertOutcome>;

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<()>;

    async fn count_records(&self) -> Result<u64>;
}

/// Fetch run bookkeeping, as seen by the cycle controller.
#[async_trait]
pub trait RunLog: Send + Sync {
    /// Persist a `running` run and return its id.
    async fn create_run(&self, queries: &[String]) -> Result<String>;

    async fn complete_run(&self, id: &str, found: u32, added: u32) -> Result<()>;

    async fn fail_run(&self, id: &str, error: &str) -> Result<()>;

    /// Increment the rotation counter and return the new value (first call: 1).
    async fn advance_run_counter(&self) -> Result<u64>;
}

/// Filter for [`Storage::list_scholarships`]. Empty filter lists everything.
#[derive(Debug, Clone, Default)]
pub struct ScholarshipFilter {
    /// Case-insensitive exact country match.
    pub country: Option<String>,
    pub level: Option<StudyLevel>,
    pub category: Option<ScholarshipCategory>,
    /// Only deadlines on or after this date.
    pub deadline_from: Option<NaiveDate>,
    pub limit: Option<u32>,
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ScholarScoutError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` without write access.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ScholarScoutError::Storage(format!(
                "database not found at {}; run `scholarscout fetch` first",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ScholarScoutError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ScholarScoutError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Scholarship queries
    // -----------------------------------------------------------------------

    /// List scholarships matching `filter`, soonest deadline first.
    ///
    /// Rows whose link no longer passes the trust policy are never returned,
    /// even if they were stored before the policy changed.
    pub async fn list_scholarships(
        &self,
        filter: &ScholarshipFilter,
    ) -> Result<Vec<ScholarshipRecord>> {
        let level = filter.level.map(|l| l.as_str());
        let category = filter.category.map(|c| c.as_str());
        let deadline_from = filter.deadline_from.map(|d| d.to_string());
        // Applied after the trust filter so hidden rows do not eat into it.
        let limit = filter.limit.map_or(usize::MAX, |n| n as usize);

        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RECORD_COLUMNS} FROM scholarships
                     WHERE (?1 IS NULL OR lower(country) = lower(?1))
                       AND (?2 IS NULL OR level = ?2)
                       AND (?3 IS NULL OR category = ?3)
                       AND (?4 IS NULL OR deadline >= ?4)
                     ORDER BY deadline, title"
                ),
                params![
                    filter.country.as_deref(),
                    level,
                    category,
                    deadline_from.as_deref()
                ],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while results.len() < limit {
            let Ok(Some(row)) = rows.next().await else {
                break;
            };
            let record = row_to_record(&row)?;
            if is_trusted_link(&record.link) {
                results.push(record);
            } else {
                debug!(id = %record.id, link = %record.link, "hiding record with untrusted link");
            }
        }
        Ok(results)
    }

    /// Get a scholarship by id.
    pub async fn get_scholarship(&self, id: &str) -> Result<Option<ScholarshipRecord>> {
        self.query_one_record(
            &format!("SELECT {RECORD_COLUMNS} FROM scholarships WHERE id = ?1"),
            id,
        )
        .await
    }

    /// Distinct host countries, alphabetically.
    pub async fn distinct_countries(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT DISTINCT country FROM scholarships ORDER BY country",
                params![],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| ScholarScoutError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Record count per study level, in level declaration order.
    pub async fn count_by_level(&self) -> Result<Vec<(StudyLevel, u64)>> {
        let mut rows = self
            .conn
            .query(
                "SELECT level, COUNT(*) FROM scholarships GROUP BY level",
                params![],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let level: String = row
                .get(0)
                .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;
            let count = row
                .get::<i64>(1)
                .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;
            results.push((parse_column::<StudyLevel>("level", &level)?, count as u64));
        }
        results.sort_by_key(|(level, _)| StudyLevel::ALL.iter().position(|l| l == level));
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Admin edits
    // -----------------------------------------------------------------------

    /// Set or clear the human verification flag. Returns false if no such id.
    pub async fn set_human_verified(&self, id: &str, verified: bool) -> Result<bool> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE scholarships SET human_verified = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, i64::from(verified), now.as_str()],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    /// Delete a scholarship. Returns false if no such id.
    pub async fn delete_scholarship(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let changed = self
            .conn
            .execute("DELETE FROM scholarships WHERE id = ?1", params![id])
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;
        Ok(changed > 0)
    }

    // -----------------------------------------------------------------------
    // Run log queries
    // -----------------------------------------------------------------------

    /// Get a fetch run by id.
    pub async fn get_run(&self, id: &str) -> Result<Option<FetchRun>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM fetch_runs WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_run(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ScholarScoutError::Storage(e.to_string())),
        }
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<FetchRun>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM fetch_runs
                     ORDER BY started_at DESC, id DESC LIMIT ?1"
                ),
                params![i64::from(limit)],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            results.push(row_to_run(&row)?);
        }
        Ok(results)
    }

    async fn query_one_record(&self, sql: &str, arg: &str) -> Result<Option<ScholarshipRecord>> {
        let mut rows = self
            .conn
            .query(sql, params![arg])
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_record(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(ScholarScoutError::Storage(e.to_string())),
        }
    }

    /// Move a running run to a terminal state; terminal runs never change.
    async fn finish_run(
        &self,
        id: &str,
        status: RunStatus,
        found: u32,
        added: u32,
        error: Option<&str>,
    ) -> Result<()> {
        self.check_writable()?;
        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE fetch_runs
                 SET status = ?2, found = ?3, added = ?4, error = ?5, completed_at = ?6
                 WHERE id = ?1 AND status = 'running'",
                params![
                    id,
                    status.as_str(),
                    i64::from(found),
                    i64::from(added),
                    error,
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        if changed == 0 {
            return Err(ScholarScoutError::Storage(format!(
                "fetch run {id} does not exist or is already finished"
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Trait implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl RecordStore for Storage {
    async fn find_by_identity(&self, identity_key: &str) -> Result<Option<ScholarshipRecord>> {
        self.query_one_record(
            &format!("SELECT {RECORD_COLUMNS} FROM scholarships WHERE identity_key = ?1"),
            identity_key,
        )
        .await
    }

    async fn insert_record(
        &self,
        candidate: &ValidatedCandidate,
        source: &str,
    ) -> Result<InsertOutcome> {
        self.check_writable()?;
        if !is_trusted_link(&candidate.link) {
            return Err(ScholarScoutError::validation(format!(
                "refusing to store untrusted link {}",
                candidate.link
            )));
        }

        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let inserted = self
            .conn
            .execute(
                "INSERT INTO scholarships (
                    id, identity_key, title, organization, country, level, field, category,
                    deadline, description, link, amount, currency, human_verified, source,
                    created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 0, ?14, ?15, ?16)
                 ON CONFLICT(identity_key) DO NOTHING",
                params![
                    id.as_str(),
                    candidate.identity_key(),
                    candidate.title.as_str(),
                    candidate.organization.as_str(),
                    candidate.country.as_str(),
                    candidate.level.as_str(),
                    candidate.field.as_str(),
                    candidate.category.as_str(),
                    candidate.deadline.to_string(),
                    candidate.description.as_str(),
                    candidate.link.as_str(),
                    candidate.amount.as_deref(),
                    candidate.currency.map(|c| c.as_str()),
                    source,
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        if inserted == 0 {
            return Ok(InsertOutcome::Conflict);
        }
        Ok(InsertOutcome::Inserted(id))
    }

    async fn update_record(&self, id: &str, patch: &RecordPatch) -> Result<()> {
        self.check_writable()?;
        if patch.is_empty() {
            return Ok(());
        }
        if let Some(link) = &patch.link {
            if !is_trusted_link(link) {
                return Err(ScholarScoutError::validation(format!(
                    "refusing to store untrusted link {link}"
                )));
            }
        }

        let now = Utc::now().to_rfc3339();
        let changed = self
            .conn
            .execute(
                "UPDATE scholarships SET
                    deadline = COALESCE(?2, deadline),
                    description = COALESCE(?3, description),
                    link = COALESCE(?4, link),
                    amount = COALESCE(?5, amount),
                    currency = COALESCE(?6, currency),
                    updated_at = ?7
                 WHERE id = ?1",
                params![
                    id,
                    patch.deadline.map(|d| d.to_string()),
                    patch.description.as_deref(),
                    patch.link.as_deref(),
                    patch.amount.as_deref(),
                    patch.currency.map(|c| c.as_str()),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        if changed == 0 {
            warn!(id, "update matched no scholarship");
        }
        Ok(())
    }

    async fn count_records(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM scholarships", params![])
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map_err(|e| ScholarScoutError::Storage(e.to_string()))?
                as u64),
            Ok(None) => Ok(0),
            Err(e) => Err(ScholarScoutError::Storage(e.to_string())),
        }
    }
}

#[async_trait]
impl RunLog for Storage {
    async fn create_run(&self, queries: &[String]) -> Result<String> {
        self.check_writable()?;
        let id = Uuid::now_v7().to_string();
        let now = Utc::now().to_rfc3339();
        let queries_json = serde_json::to_string(queries)
            .map_err(|e| ScholarScoutError::Storage(format!("failed to encode queries: {e}")))?;

        self.conn
            .execute(
                "INSERT INTO fetch_runs (id, queries_json, status, started_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.as_str(),
                    queries_json.as_str(),
                    RunStatus::Running.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;
        Ok(id)
    }

    async fn complete_run(&self, id: &str, found: u32, added: u32) -> Result<()> {
        self.finish_run(id, RunStatus::Completed, found, added, None)
            .await
    }

    async fn fail_run(&self, id: &str, error: &str) -> Result<()> {
        self.finish_run(id, RunStatus::Failed, 0, 0, Some(error))
            .await
    }

    async fn advance_run_counter(&self) -> Result<u64> {
        self.check_writable()?;
        let mut rows = self
            .conn
            .query(
                "INSERT INTO counters (name, value) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET value = value + 1
                 RETURNING value",
                params![FETCH_CYCLE_COUNTER],
            )
            .await
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(row
                .get::<i64>(0)
                .map_err(|e| ScholarScoutError::Storage(e.to_string()))?
                as u64),
            Ok(None) => Err(ScholarScoutError::Storage(
                "counter upsert returned no row".into(),
            )),
            Err(e) => Err(ScholarScoutError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

const RECORD_COLUMNS: &str = "id, identity_key, title, organization, country, level, field, \
     category, deadline, description, link, amount, currency, human_verified, source, \
     created_at, updated_at";

const RUN_COLUMNS: &str =
    "id, queries_json, status, found, added, error, started_at, completed_at";

fn text(row: &Row, idx: i32) -> Result<String> {
    row.get::<String>(idx)
        .map_err(|e| ScholarScoutError::Storage(e.to_string()))
}

fn parse_column<T: std::str::FromStr<Err = String>>(column: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|e| ScholarScoutError::Storage(format!("invalid {column} in database: {e}")))
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScholarScoutError::Storage(format!("invalid date: {e}")))
}

/// Convert a database row to a [`ScholarshipRecord`].
fn row_to_record(row: &Row) -> Result<ScholarshipRecord> {
    let deadline = text(row, 8)?;
    Ok(ScholarshipRecord {
        id: text(row, 0)?,
        identity_key: text(row, 1)?,
        title: text(row, 2)?,
        organization: text(row, 3)?,
        country: text(row, 4)?,
        level: parse_column("level", &text(row, 5)?)?,
        field: text(row, 6)?,
        category: parse_column("category", &text(row, 7)?)?,
        deadline: NaiveDate::parse_from_str(&deadline, "%Y-%m-%d")
            .map_err(|e| ScholarScoutError::Storage(format!("invalid deadline: {e}")))?,
        description: text(row, 9)?,
        link: text(row, 10)?,
        amount: row.get::<String>(11).ok(),
        currency: row
            .get::<String>(12)
            .ok()
            .map(|c| parse_column::<Currency>("currency", &c))
            .transpose()?,
        human_verified: row
            .get::<i64>(13)
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?
            != 0,
        source: text(row, 14)?,
        created_at: parse_timestamp(&text(row, 15)?)?,
        updated_at: parse_timestamp(&text(row, 16)?)?,
    })
}

/// Convert a database row to a [`FetchRun`].
fn row_to_run(row: &Row) -> Result<FetchRun> {
    let queries_json = text(row, 1)?;
    Ok(FetchRun {
        id: text(row, 0)?,
        queries: serde_json::from_str(&queries_json)
            .map_err(|e| ScholarScoutError::Storage(format!("invalid queries_json: {e}")))?,
        status: parse_column("status", &text(row, 2)?)?,
        found: row
            .get::<u32>(3)
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?,
        added: row
            .get::<u32>(4)
            .map_err(|e| ScholarScoutError::Storage(e.to_string()))?,
        error: row.get::<String>(5).ok(),
        started_at: parse_timestamp(&text(row, 6)?)?,
        completed_at: row
            .get::<String>(7)
            .ok()
            .map(|s| parse_timestamp(&s))
            .transpose()?,
    })
}

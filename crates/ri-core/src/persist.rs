//! Persistence writer: transactional batch inserts with per-record fallback.
//!
//! Primary path treats a whole batch as one all-or-nothing transaction. If
//! that transaction fails for any reason, it is rolled back entirely and the
//! writer degrades to independent per-record inserts, each in its own unit of
//! work. A unique-key violation on email is classified as a non-fatal
//! "duplicate, skipped" outcome; any other per-record failure is tallied with
//! its reason and does not abort the remaining records. Only loss of the
//! store itself aborts the pipeline.
//!
//! The fallback provides no atomicity guarantee: a transient mid-batch
//! failure can re-attempt writes that partially succeeded, so the honest
//! guarantee is at-least-once outside the unique-email constraint.

use std::path::Path;

use rusqlite::{params, Connection, ErrorCode, OpenFlags};
use serde::Serialize;
use tracing::{debug, warn};

use ri_common::{
    Batch, Error, PersistenceOutcome, RawRecord, RecordError, Result, ValidatedRecord,
};

use crate::validate::{parse_hire_date, parse_salary};

/// Reason string for unique-email collisions.
pub const DUPLICATE_EMAIL: &str = "duplicate-email";

/// Reason string for records that reached the writer without passing
/// validation (filtering disabled); they are never attempted.
pub const NOT_VALIDATED: &str = "failed-validation";

const BUSY_TIMEOUT_MS: u64 = 5_000;

/// Fixed insert column list shared by the transactional and fallback paths.
const INSERT_COLUMNS: [&str; 8] = [
    "first_name",
    "last_name",
    "email",
    "department",
    "job_title",
    "hire_date",
    "salary",
    "raw_record",
];

const TABLE_DDL: &str = "
CREATE TABLE IF NOT EXISTS employees (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    email       TEXT NOT NULL UNIQUE,
    department  TEXT,
    job_title   TEXT,
    hire_date   TEXT,
    salary      REAL CHECK (salary IS NULL OR salary >= 0),
    created_at  TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    raw_record  TEXT NOT NULL
);
";

/// Build the parameterized insert from the fixed column list.
fn insert_sql() -> String {
    let placeholders: Vec<String> = (1..=INSERT_COLUMNS.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO employees ({}) VALUES ({})",
        INSERT_COLUMNS.join(", "),
        placeholders.join(", ")
    )
}

/// Open handle to the target store. An explicit dependency of the writer:
/// opened at pipeline start, closed on drop at pipeline end or abort.
#[derive(Debug)]
pub struct EmployeeStore {
    conn: Connection,
}

impl EmployeeStore {
    /// Open (creating if needed) the store at `path` and ensure the schema.
    pub fn open(path: &Path) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| Error::StoreUnavailable(format!("{}: {e}", path.display())))?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
            .map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        conn.execute_batch(TABLE_DDL)
            .map_err(|e| Error::StoreUnavailable(format!("schema init: {e}")))?;
        Ok(Self { conn })
    }

    /// Total rows in the employees table.
    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM employees", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(|e| Error::StoreUnavailable(e.to_string()))
    }
}

/// Counters owned by the writer, merged into the summary at the join point.
#[derive(Debug, Clone, Default, Serialize)]
pub struct WriterStats {
    pub batches: u64,
    pub fallback_batches: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub failed_other: u64,
    /// Invalid records that reached the writer and were never attempted.
    pub skipped_invalid: u64,
    pub record_errors: Vec<RecordError>,
}

/// Commits batches against the store.
pub struct BatchWriter {
    store: EmployeeStore,
    pub stats: WriterStats,
}

/// Field values bound into the insert statement, in `INSERT_COLUMNS` order.
struct RowValues {
    first_name: String,
    last_name: String,
    email: String,
    department: Option<String>,
    job_title: Option<String>,
    hire_date: Option<String>,
    salary: Option<f64>,
    raw_json: String,
}

impl RowValues {
    fn from_record(record: &RawRecord) -> Self {
        Self {
            first_name: record.get_trimmed("first_name").unwrap_or_default().to_string(),
            last_name: record.get_trimmed("last_name").unwrap_or_default().to_string(),
            email: record.get_trimmed("email").unwrap_or_default().to_string(),
            department: record.get_trimmed("department").map(str::to_string),
            job_title: record.get_trimmed("job_title").map(str::to_string),
            // Normalized to ISO regardless of the input format.
            hire_date: record
                .get_trimmed("hire_date")
                .and_then(parse_hire_date)
                .map(|d| d.format("%Y-%m-%d").to_string()),
            salary: record.get_trimmed("salary").and_then(parse_salary),
            raw_json: record.to_audit_json().to_string(),
        }
    }
}

impl BatchWriter {
    pub fn new(store: EmployeeStore) -> Self {
        Self {
            store,
            stats: WriterStats::default(),
        }
    }

    pub fn into_stats(self) -> WriterStats {
        self.stats
    }

    /// Persist one batch. Data-level failures are tallied in the returned
    /// outcome; only store-level failures are `Err`.
    pub fn write_batch(&mut self, batch: &Batch) -> Result<PersistenceOutcome> {
        self.stats.batches += 1;

        let mut outcome = PersistenceOutcome::default();
        let attempts: Vec<&ValidatedRecord> = batch
            .iter()
            .filter(|r| {
                if r.is_valid() {
                    true
                } else {
                    // Filtering disabled upstream: report, never attempt.
                    outcome.failed += 1;
                    outcome.record_errors.push(RecordError {
                        email: r.record.get_trimmed("email").unwrap_or_default().to_string(),
                        reason: NOT_VALIDATED.to_string(),
                    });
                    false
                }
            })
            .collect();
        self.stats.skipped_invalid += outcome.failed;

        if attempts.is_empty() {
            self.merge(&outcome);
            return Ok(outcome);
        }

        match self.insert_transactional(&attempts) {
            Ok(inserted) => {
                outcome.inserted = inserted;
                debug!(batch = self.stats.batches, inserted, "batch committed");
            }
            Err(e) if is_store_unavailable(&e) => {
                return Err(Error::StoreUnavailable(e.to_string()));
            }
            Err(e) => {
                warn!(
                    batch = self.stats.batches,
                    error = %e,
                    "batched insert failed, falling back to per-record writes"
                );
                self.stats.fallback_batches += 1;
                outcome.fell_back = true;
                self.insert_individually(&attempts, &mut outcome)?;
            }
        }

        self.merge(&outcome);
        Ok(outcome)
    }

    /// All-or-nothing path: the whole batch in one transaction.
    fn insert_transactional(&mut self, records: &[&ValidatedRecord]) -> rusqlite::Result<u64> {
        let sql = insert_sql();
        let tx = self.store.conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(&sql)?;
            for rec in records {
                let v = RowValues::from_record(&rec.record);
                stmt.execute(params![
                    v.first_name,
                    v.last_name,
                    v.email,
                    v.department,
                    v.job_title,
                    v.hire_date,
                    v.salary,
                    v.raw_json,
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len() as u64)
    }

    /// Degraded path: independent per-record autocommit inserts, no further
    /// grouping, no atomicity.
    fn insert_individually(
        &mut self,
        records: &[&ValidatedRecord],
        outcome: &mut PersistenceOutcome,
    ) -> Result<()> {
        let sql = insert_sql();
        for rec in records {
            let v = RowValues::from_record(&rec.record);
            let email = v.email.clone();
            let res = self.store.conn.execute(
                &sql,
                params![
                    v.first_name,
                    v.last_name,
                    v.email,
                    v.department,
                    v.job_title,
                    v.hire_date,
                    v.salary,
                    v.raw_json,
                ],
            );
            match res {
                Ok(_) => outcome.inserted += 1,
                Err(e) if is_store_unavailable(&e) => {
                    return Err(Error::StoreUnavailable(e.to_string()));
                }
                Err(e) => {
                    let reason = classify_record_error(&e);
                    debug!(email = %email, reason = %reason, "record skipped");
                    outcome.failed += 1;
                    outcome.record_errors.push(RecordError { email, reason });
                }
            }
        }
        Ok(())
    }

    fn merge(&mut self, outcome: &PersistenceOutcome) {
        self.stats.inserted += outcome.inserted;
        for err in &outcome.record_errors {
            if err.reason == DUPLICATE_EMAIL {
                self.stats.duplicates += 1;
            } else if err.reason != NOT_VALIDATED {
                self.stats.failed_other += 1;
            }
        }
        self.stats.record_errors.extend(outcome.record_errors.iter().cloned());
    }

    pub fn store(&self) -> &EmployeeStore {
        &self.store
    }
}

/// Classify a per-record failure. A unique violation on the email column is
/// the well-known "duplicate, skipped" case; everything else keeps its
/// underlying reason.
fn classify_record_error(e: &rusqlite::Error) -> String {
    if let rusqlite::Error::SqliteFailure(f, Some(msg)) = e {
        if f.code == ErrorCode::ConstraintViolation && msg.contains("employees.email") {
            return DUPLICATE_EMAIL.to_string();
        }
    }
    e.to_string()
}

/// Store-level failures that make even a per-record attempt impossible.
fn is_store_unavailable(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _) if matches!(
            f.code,
            ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::DatabaseCorrupt
                | ErrorCode::PermissionDenied
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ri_common::{ValidationOutcome, COLUMNS};

    fn record(email: &str) -> ValidatedRecord {
        record_with(email, "Ada", "2021-03-15", "90000")
    }

    fn record_with(email: &str, first: &str, hire_date: &str, salary: &str) -> ValidatedRecord {
        let headers: Arc<[String]> = COLUMNS.iter().map(|c| c.to_string()).collect();
        let values = vec![
            first.into(),
            "Lovelace".into(),
            email.into(),
            "Engineering".into(),
            "Analyst".into(),
            hire_date.into(),
            salary.into(),
        ];
        let record = RawRecord::new(headers, values, 1);
        let outcome = crate::validate::validate(&record);
        ValidatedRecord { record, outcome }
    }

    fn writer() -> BatchWriter {
        BatchWriter::new(EmployeeStore::open_in_memory().unwrap())
    }

    #[test]
    fn insert_sql_uses_fixed_columns_and_placeholders() {
        let sql = insert_sql();
        assert!(sql.starts_with("INSERT INTO employees (first_name, last_name, email"));
        assert!(sql.ends_with("(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"));
    }

    #[test]
    fn clean_batch_commits_transactionally() {
        let mut w = writer();
        let batch: Batch = (0..5).map(|i| record(&format!("u{i}@example.com"))).collect();
        let outcome = w.write_batch(&batch).unwrap();
        assert_eq!(outcome.inserted, 5);
        assert_eq!(outcome.failed, 0);
        assert!(!outcome.fell_back);
        assert_eq!(w.store().count().unwrap(), 5);
        assert_eq!(w.stats.fallback_batches, 0);
    }

    #[test]
    fn duplicate_within_batch_falls_back_and_skips_one() {
        let mut w = writer();
        let batch: Batch = vec![
            record("same@example.com"),
            record("other@example.com"),
            record("same@example.com"),
        ];
        let outcome = w.write_batch(&batch).unwrap();
        assert!(outcome.fell_back);
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.record_errors.len(), 1);
        assert_eq!(outcome.record_errors[0].reason, DUPLICATE_EMAIL);
        assert_eq!(outcome.record_errors[0].email, "same@example.com");
        assert_eq!(w.store().count().unwrap(), 2);
        assert_eq!(w.stats.duplicates, 1);
    }

    #[test]
    fn duplicate_across_batches_is_skipped_per_record() {
        let mut w = writer();
        w.write_batch(&vec![record("a@example.com")]).unwrap();
        let outcome = w.write_batch(&vec![record("a@example.com")]).unwrap();
        // The second batch's transaction fails as a whole, then the single
        // record fails individually with the duplicate reason.
        assert!(outcome.fell_back);
        assert_eq!(outcome.inserted, 0);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.record_errors[0].reason, DUPLICATE_EMAIL);
        assert_eq!(w.store().count().unwrap(), 1);
        // stored + duplicates covers the pair.
        assert_eq!(w.stats.inserted + w.stats.duplicates, 2);
    }

    #[test]
    fn fallback_preserves_remaining_records_after_failure() {
        let mut w = writer();
        w.write_batch(&vec![record("dup@example.com")]).unwrap();
        let batch: Batch = vec![
            record("x@example.com"),
            record("dup@example.com"),
            record("y@example.com"),
        ];
        let outcome = w.write_batch(&batch).unwrap();
        assert_eq!(outcome.inserted, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(w.store().count().unwrap(), 3);
    }

    #[test]
    fn optional_fields_stored_as_null() {
        let mut w = writer();
        let rec = record_with("n@example.com", "Nia", "", "");
        w.write_batch(&vec![rec]).unwrap();
        let (dept, hire, salary): (Option<String>, Option<String>, Option<f64>) = w
            .store()
            .conn
            .query_row(
                "SELECT department, hire_date, salary FROM employees WHERE email = 'n@example.com'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(dept.as_deref(), Some("Engineering"));
        assert_eq!(hire, None);
        assert_eq!(salary, None);
    }

    #[test]
    fn hire_date_is_normalized_to_iso() {
        let mut w = writer();
        let rec = record_with("d@example.com", "Dee", "03/15/2021", "100");
        w.write_batch(&vec![rec]).unwrap();
        let hire: String = w
            .store()
            .conn
            .query_row(
                "SELECT hire_date FROM employees WHERE email = 'd@example.com'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hire, "2021-03-15");
    }

    #[test]
    fn audit_copy_round_trips() {
        let mut w = writer();
        w.write_batch(&vec![record("audit@example.com")]).unwrap();
        let raw: String = w
            .store()
            .conn
            .query_row(
                "SELECT raw_record FROM employees WHERE email = 'audit@example.com'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["email"], "audit@example.com");
        assert_eq!(json["first_name"], "Ada");
    }

    #[test]
    fn invalid_record_reaching_writer_is_reported_not_attempted() {
        let mut w = writer();
        let invalid = record_with("", "", "", "");
        let outcome = w.write_batch(&vec![invalid, record("ok@example.com")]).unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.record_errors[0].reason, NOT_VALIDATED);
        assert!(!outcome.fell_back);
        assert_eq!(w.stats.skipped_invalid, 1);
        assert_eq!(w.stats.failed_other, 0);
    }

    #[test]
    fn missing_store_path_is_unavailable() {
        let err = EmployeeStore::open(Path::new("/nonexistent/dir/employees.db")).unwrap_err();
        assert!(matches!(err, Error::StoreUnavailable(_)));
        assert_eq!(err.code(), 30);
    }
}

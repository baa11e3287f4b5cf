//! Deterministic test-fixture generation.
//!
//! Writes a CSV in the expected input shape with a seeded RNG, a
//! deterministic invalid subset (every k-th row for rate 1/k), and optional
//! duplicate-email rows for exercising the unique-key path. Used by the
//! `generate` CLI subcommand and the integration tests.

use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use ri_common::{Error, Result, COLUMNS};

const FIRST_NAMES: [&str; 8] = [
    "Ada", "Alan", "Grace", "Edsger", "Barbara", "Donald", "Radia", "Niklaus",
];
const LAST_NAMES: [&str; 8] = [
    "Lovelace", "Turing", "Hopper", "Dijkstra", "Liskov", "Knuth", "Perlman", "Wirth",
];
const DEPARTMENTS: [&str; 5] = ["Engineering", "Research", "Operations", "Finance", "People"];
const JOB_TITLES: [&str; 5] = ["Engineer", "Analyst", "Manager", "Director", "Fellow"];

/// Fixture parameters.
#[derive(Debug, Clone)]
pub struct FixtureSpec {
    pub rows: usize,
    /// Fraction of rows made invalid, applied as a deterministic stride
    /// (0.1 -> every 10th row). 0 disables.
    pub invalid_rate: f64,
    /// Trailing rows that reuse the first generated email.
    pub duplicates: usize,
    pub seed: u64,
}

impl Default for FixtureSpec {
    fn default() -> Self {
        Self {
            rows: 1000,
            invalid_rate: 0.1,
            duplicates: 0,
            seed: 42,
        }
    }
}

/// What was actually written.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FixtureStats {
    pub rows: usize,
    pub invalid: usize,
    pub duplicates: usize,
}

/// Write the fixture file.
pub fn write_fixture(path: &Path, spec: &FixtureSpec) -> Result<FixtureStats> {
    if spec.invalid_rate < 0.0 || spec.invalid_rate > 1.0 {
        return Err(Error::Config(format!(
            "invalid rate must be within 0..=1, got {}",
            spec.invalid_rate
        )));
    }
    let stride = if spec.invalid_rate > 0.0 {
        (1.0 / spec.invalid_rate).round() as usize
    } else {
        0
    };
    let duplicates = spec.duplicates.min(spec.rows.saturating_sub(1));
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let mut stats = FixtureStats {
        rows: spec.rows,
        ..Default::default()
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(COLUMNS).map_err(csv_err)?;

    let mut first_email: Option<String> = None;
    for idx in 0..spec.rows {
        let is_duplicate = duplicates > 0 && idx >= spec.rows - duplicates;
        let is_invalid = !is_duplicate && stride > 0 && idx % stride == 0;

        let first = FIRST_NAMES[rng.random_range(0..FIRST_NAMES.len())];
        let last = LAST_NAMES[rng.random_range(0..LAST_NAMES.len())];
        let department = DEPARTMENTS[rng.random_range(0..DEPARTMENTS.len())];
        let title = JOB_TITLES[rng.random_range(0..JOB_TITLES.len())];
        let hire_date = format!(
            "{:04}-{:02}-{:02}",
            rng.random_range(2010..=2024),
            rng.random_range(1..=12),
            rng.random_range(1..=28)
        );
        let salary = format!("{:.2}", rng.random_range(40_000.0..180_000.0));
        let email = format!("emp{idx:05}@example.com");

        let row: [String; 7] = if is_invalid {
            stats.invalid += 1;
            // Rotate through the three defect kinds deterministically.
            match idx % 3 {
                0 => make_row("", last, &email, department, title, &hire_date, &salary),
                1 => make_row(first, last, "not-an-email", department, title, &hire_date, &salary),
                _ => make_row(first, last, &email, department, title, &hire_date, "-100"),
            }
        } else if is_duplicate {
            stats.duplicates += 1;
            let dup_email = first_email.clone().unwrap_or_else(|| email.clone());
            make_row(first, last, &dup_email, department, title, &hire_date, &salary)
        } else {
            if first_email.is_none() {
                first_email = Some(email.clone());
            }
            make_row(first, last, &email, department, title, &hire_date, &salary)
        };
        writer.write_record(&row).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(stats)
}

fn csv_err(e: csv::Error) -> Error {
    match e.into_kind() {
        csv::ErrorKind::Io(io) => Error::Io(io),
        other => Error::Internal(format!("fixture write: {other:?}")),
    }
}

fn make_row(
    first: &str,
    last: &str,
    email: &str,
    department: &str,
    title: &str,
    hire_date: &str,
    salary: &str,
) -> [String; 7] {
    [
        first.to_string(),
        last.to_string(),
        email.to_string(),
        department.to_string(),
        title.to_string(),
        hire_date.to_string(),
        salary.to_string(),
    ]
}

//! Pure record validation.
//!
//! `validate` is deterministic and side-effect free. All rules are evaluated
//! (not short-circuited) so a record's failure reasons are reported together,
//! in rule order.

use chrono::NaiveDate;

use ri_common::{RawRecord, ValidatedRecord, ValidationOutcome};

pub const ERR_FIRST_NAME: &str = "First name is required";
pub const ERR_LAST_NAME: &str = "Last name is required";
pub const ERR_EMAIL_REQUIRED: &str = "Email is required";
pub const ERR_EMAIL_FORMAT: &str = "Invalid email format";
pub const ERR_HIRE_DATE: &str = "Invalid hire date";
pub const ERR_SALARY: &str = "Salary must be a non-negative number";

/// Accepted hire-date formats, tried in order.
const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Validate a single record against all rules.
pub fn validate(record: &RawRecord) -> ValidationOutcome {
    let mut errors = Vec::new();

    if record.get_trimmed("first_name").is_none() {
        errors.push(ERR_FIRST_NAME.to_string());
    }
    if record.get_trimmed("last_name").is_none() {
        errors.push(ERR_LAST_NAME.to_string());
    }
    match record.get_trimmed("email") {
        None => errors.push(ERR_EMAIL_REQUIRED.to_string()),
        Some(email) if !is_plausible_email(email) => {
            errors.push(ERR_EMAIL_FORMAT.to_string());
        }
        Some(_) => {}
    }
    if let Some(raw) = record.get_trimmed("hire_date") {
        if parse_hire_date(raw).is_none() {
            errors.push(ERR_HIRE_DATE.to_string());
        }
    }
    if let Some(raw) = record.get_trimmed("salary") {
        if parse_salary(raw).is_none() {
            errors.push(ERR_SALARY.to_string());
        }
    }

    if errors.is_empty() {
        ValidationOutcome::valid()
    } else {
        ValidationOutcome::invalid(errors)
    }
}

/// Pair a record with its validation outcome.
pub fn validate_record(record: RawRecord) -> ValidatedRecord {
    let outcome = validate(&record);
    ValidatedRecord { record, outcome }
}

/// Basic `local@domain.tld` shape: at least one `@` with a non-empty local
/// part, at least one interior `.` after it, and no whitespace anywhere.
pub fn is_plausible_email(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }
    let Some(at) = s.find('@') else {
        return false;
    };
    if at == 0 {
        return false;
    }
    let domain = &s[at + 1..];
    match domain.find('.') {
        // The dot must separate non-empty labels.
        Some(dot) => dot > 0 && dot < domain.len() - 1,
        None => false,
    }
}

/// Parse a hire date in any accepted format.
pub fn parse_hire_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a salary as a non-negative number.
pub fn parse_salary(s: &str) -> Option<f64> {
    match s.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.is_finite() => Some(v),
        _ => None,
    }
}

/// Counters owned by the validation stage.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct ValidateStats {
    /// Records that completed validation; equals valid + invalid.
    pub parsed: u64,
    pub valid: u64,
    pub invalid: u64,
}

/// Pipeline stage wrapping the pure validator. Every record passes through;
/// dropping invalid records is the batcher's concern.
#[derive(Debug, Default)]
pub struct ValidateStage {
    pub stats: ValidateStats,
}

impl crate::pipeline::Stage for ValidateStage {
    type In = RawRecord;
    type Out = ValidatedRecord;

    fn name(&self) -> &'static str {
        "validate"
    }

    fn process(&mut self, record: RawRecord) -> ri_common::Result<Option<ValidatedRecord>> {
        let validated = validate_record(record);
        self.stats.parsed += 1;
        if validated.is_valid() {
            self.stats.valid += 1;
        } else {
            self.stats.invalid += 1;
            tracing::debug!(
                line = validated.record.line(),
                errors = ?validated.outcome.errors,
                "record failed validation"
            );
        }
        Ok(Some(validated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use ri_common::COLUMNS;

    fn record(
        first: &str,
        last: &str,
        email: &str,
        hire_date: &str,
        salary: &str,
    ) -> RawRecord {
        let headers: Arc<[String]> = COLUMNS.iter().map(|c| c.to_string()).collect();
        RawRecord::new(
            headers,
            vec![
                first.into(),
                last.into(),
                email.into(),
                "Engineering".into(),
                "Engineer".into(),
                hire_date.into(),
                salary.into(),
            ],
            1,
        )
    }

    #[test]
    fn valid_record_has_no_errors() {
        let out = validate(&record("A", "B", "a@b.com", "", ""));
        assert!(out.is_valid);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn missing_first_name_reported() {
        let out = validate(&record("", "Lee", "a@b.com", "", ""));
        assert!(!out.is_valid);
        assert!(out.errors.contains(&ERR_FIRST_NAME.to_string()));
    }

    #[test]
    fn bad_email_shape_reported() {
        let out = validate(&record("A", "B", "not-an-email", "", ""));
        assert!(!out.is_valid);
        assert!(out.errors.contains(&ERR_EMAIL_FORMAT.to_string()));
    }

    #[test]
    fn all_failures_reported_together_in_rule_order() {
        let out = validate(&record("  ", "", "nope", "13/45/20", "-5"));
        assert_eq!(
            out.errors,
            vec![
                ERR_FIRST_NAME,
                ERR_LAST_NAME,
                ERR_EMAIL_FORMAT,
                ERR_HIRE_DATE,
                ERR_SALARY,
            ]
        );
    }

    #[test]
    fn optional_fields_may_be_blank() {
        let out = validate(&record("A", "B", "a@b.com", "  ", " "));
        assert!(out.is_valid);
    }

    #[test]
    fn email_shapes() {
        for good in ["a@b.com", "first.last@sub.domain.org", "x@y.co"] {
            assert!(is_plausible_email(good), "{good} should pass");
        }
        for bad in [
            "plain",
            "@b.com",
            "a@bcom",
            "a@.com",
            "a@com.",
            "a b@c.com",
            "a@b .com",
        ] {
            assert!(!is_plausible_email(bad), "{bad} should fail");
        }
    }

    #[test]
    fn hire_date_formats() {
        assert!(parse_hire_date("2021-03-15").is_some());
        assert!(parse_hire_date("03/15/2021").is_some());
        assert!(parse_hire_date("15th of March").is_none());
        assert!(parse_hire_date("2021-02-30").is_none());
    }

    #[test]
    fn salary_must_be_non_negative() {
        assert_eq!(parse_salary("0"), Some(0.0));
        assert_eq!(parse_salary("123456.78"), Some(123456.78));
        assert!(parse_salary("-1").is_none());
        assert!(parse_salary("NaN").is_none());
        assert!(parse_salary("1e999").is_none());
        assert!(parse_salary("ten").is_none());
    }

    #[test]
    fn validation_is_deterministic() {
        let rec = record("", "B", "bad", "x", "-2");
        assert_eq!(validate(&rec).errors, validate(&rec).errors);
    }
}

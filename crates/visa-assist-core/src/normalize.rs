//! Dataset normalizer: raw passport-index rows → [`VisaRule`]s.
//!
//! # Rules
//!
//! 1. Rows whose passport equals the destination are dropped.
//! 2. Rows whose requirement is the not-applicable sentinel `-1` are dropped.
//! 3. The requirement token is parsed into a [`Requirement`] and rendered
//!    through a fixed mapping; unknown tokens are rejected.
//! 4. Both codes must resolve to display names; unknown codes are rejected.
//!
//! Dropped rows are counted. Rejected rows are collected with their error and
//! processing continues (skip-and-report). Output order follows input order
//! and no deduplication is performed.

use crate::countries::country_name;
use crate::error::Error;
use crate::models::{RawVisaRow, Requirement, VisaRule};

/// Requirement token meaning "not applicable" (self-pairs in the dataset).
pub const NOT_APPLICABLE: &str = "-1";

/// A row that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowRejection {
    /// 0-based index of the row in the input sequence.
    pub row: usize,
    pub raw: RawVisaRow,
    pub error: Error,
}

/// Result of normalizing a dataset.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOutcome {
    pub rules: Vec<VisaRule>,
    /// Self-pairs and not-applicable rows.
    pub dropped: usize,
    pub rejected: Vec<RowRejection>,
}

/// Parse a requirement token.
///
/// Accepts a non-negative day count or one of the fixed categorical tags
/// (case-insensitive, surrounding whitespace ignored).
pub fn parse_requirement(token: &str) -> Result<Requirement, Error> {
    let t = token.trim();
    if !t.is_empty() && t.bytes().all(|b| b.is_ascii_digit()) {
        return t
            .parse::<u32>()
            .map(Requirement::VisaFreeDays)
            .map_err(|_| Error::UnknownRequirementKind {
                token: token.to_string(),
            });
    }

    match t.to_ascii_lowercase().as_str() {
        "visa free" => Ok(Requirement::VisaFree),
        "visa on arrival" => Ok(Requirement::VisaOnArrival),
        "eta" => Ok(Requirement::Eta),
        "e-visa" => Ok(Requirement::EVisa),
        "visa required" => Ok(Requirement::VisaRequired),
        "no admission" => Ok(Requirement::NoAdmission),
        _ => Err(Error::UnknownRequirementKind {
            token: token.to_string(),
        }),
    }
}

/// Render a requirement token into its human-readable text.
pub fn format_requirement(token: &str) -> Result<String, Error> {
    parse_requirement(token).map(|r| r.render())
}

/// Validate one row. `Ok(None)` means the row is a self pair and is dropped.
pub fn normalize_row(raw: &RawVisaRow) -> Result<Option<VisaRule>, Error> {
    let passport = raw.passport.trim().to_ascii_uppercase();
    let destination = raw.destination.trim().to_ascii_uppercase();
    let token = raw.requirement.trim();

    if passport == destination || token == NOT_APPLICABLE {
        return Ok(None);
    }

    let requirement_text = format_requirement(token)?;
    let passport_name =
        country_name(&passport).ok_or_else(|| Error::UnknownCountryCode {
            code: raw.passport.clone(),
        })?;
    let destination_name =
        country_name(&destination).ok_or_else(|| Error::UnknownCountryCode {
            code: raw.destination.clone(),
        })?;

    Ok(Some(VisaRule {
        passport_code: passport,
        passport_name: passport_name.to_string(),
        destination_code: destination,
        destination_name: destination_name.to_string(),
        requirement_raw: token.to_string(),
        requirement_text,
    }))
}

/// Normalize all rows, skipping and reporting bad ones.
pub fn normalize(rows: &[RawVisaRow]) -> NormalizeOutcome {
    let mut outcome = NormalizeOutcome::default();

    for (i, raw) in rows.iter().enumerate() {
        match normalize_row(raw) {
            Ok(Some(rule)) => outcome.rules.push(rule),
            Ok(None) => outcome.dropped += 1,
            Err(error) => {
                tracing::warn!(row = i, %error, "rejected visa row");
                outcome.rejected.push(RowRejection {
                    row: i,
                    raw: raw.clone(),
                    error,
                });
            }
        }
    }

    outcome
}

/// Like [`normalize`], but fails when more than `max_rejected` rows are bad.
pub fn normalize_with_tolerance(
    rows: &[RawVisaRow],
    max_rejected: usize,
) -> Result<NormalizeOutcome, Error> {
    let outcome = normalize(rows);
    if outcome.rejected.len() > max_rejected {
        return Err(Error::TooManyRejectedRows {
            rejected: outcome.rejected.len(),
            tolerance: max_rejected,
        });
    }
    Ok(outcome)
}

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// English month names, indexed by `month - 1`.
pub const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("month {0} is out of range (1..=12)")]
    MonthOutOfRange(u32),

    #[error("invalid period '{0}': expected YYYY-MM")]
    Malformed(String),
}

// ============================================================================
// Period
// ============================================================================

/// A (year, month) unit of work corresponding to one dataset export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: i32,
    month: u32,
}

impl Period {
    pub fn new(year: i32, month: u32) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&month) {
            return Err(PeriodError::MonthOutOfRange(month));
        }
        Ok(Self { year, month })
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn month_name(&self) -> &'static str {
        MONTH_NAMES[(self.month - 1) as usize]
    }

    /// The period immediately after this one, `None` past the last representable year.
    pub fn next(&self) -> Option<Self> {
        if self.month == 12 {
            Some(Self {
                year: self.year.checked_add(1)?,
                month: 1,
            })
        } else {
            Some(Self {
                year: self.year,
                month: self.month + 1,
            })
        }
    }

    /// Every period from `from` through `to`, inclusive, in chronological order.
    pub fn range(from: Period, to: Period) -> Vec<Period> {
        let mut out = Vec::new();
        let mut current = Some(from);
        while let Some(period) = current.filter(|p| *p <= to) {
            out.push(period);
            current = period.next();
        }
        out
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Period {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || PeriodError::Malformed(s.to_string());
        let (year, month) = s.trim().split_once('-').ok_or_else(malformed)?;
        let year: i32 = year.parse().map_err(|_| malformed())?;
        let month: u32 = month.parse().map_err(|_| malformed())?;
        Period::new(year, month)
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// Resolved display name of a form control that was toggled on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SelectedField(String);

impl SelectedField {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SelectedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SelectedField {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Success,
    Failed,
}

impl DownloadStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DownloadStatus::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Success => "success",
            DownloadStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable record of one download attempt.
///
/// Only the two constructors can build one, so `status == Success` holds
/// exactly when a filename is present. A successful outcome may still carry a
/// warning in `error` when a non-fatal step (field selection) went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    period: Period,
    fields_selected: Vec<SelectedField>,
    status: DownloadStatus,
    filename: Option<String>,
    size_bytes: Option<u64>,
    error: Option<String>,
}

impl DownloadOutcome {
    pub fn succeeded(
        period: Period,
        fields_selected: Vec<SelectedField>,
        filename: impl Into<String>,
        size_bytes: Option<u64>,
        warning: Option<String>,
    ) -> Self {
        Self {
            period,
            fields_selected,
            status: DownloadStatus::Success,
            filename: Some(filename.into()),
            size_bytes,
            error: warning,
        }
    }

    pub fn failed(
        period: Period,
        fields_selected: Vec<SelectedField>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            period,
            fields_selected,
            status: DownloadStatus::Failed,
            filename: None,
            size_bytes: None,
            error: Some(error.into()),
        }
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn fields_selected(&self) -> &[SelectedField] {
        &self.fields_selected
    }

    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size_bytes
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_rejects_out_of_range_month() {
        assert_eq!(Period::new(2023, 0), Err(PeriodError::MonthOutOfRange(0)));
        assert_eq!(Period::new(2023, 13), Err(PeriodError::MonthOutOfRange(13)));
        assert!(Period::new(2023, 12).is_ok());
    }

    #[test]
    fn test_period_month_name() {
        assert_eq!(Period::new(2023, 1).unwrap().month_name(), "January");
        assert_eq!(Period::new(2025, 11).unwrap().month_name(), "November");
    }

    #[test]
    fn test_period_parse_and_display() {
        let period: Period = "2023-01".parse().unwrap();
        assert_eq!(period.year(), 2023);
        assert_eq!(period.month(), 1);
        assert_eq!(period.to_string(), "2023-01");

        assert!(matches!("2023".parse::<Period>(), Err(PeriodError::Malformed(_))));
        assert!(matches!("2023-xx".parse::<Period>(), Err(PeriodError::Malformed(_))));
        assert_eq!("2023-14".parse::<Period>(), Err(PeriodError::MonthOutOfRange(14)));
    }

    #[test]
    fn test_period_range_crosses_year_boundary() {
        let from = Period::new(2023, 11).unwrap();
        let to = Period::new(2024, 2).unwrap();
        let names: Vec<String> = Period::range(from, to).iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["2023-11", "2023-12", "2024-01", "2024-02"]);

        assert!(Period::range(to, from).is_empty());
    }

    #[test]
    fn test_period_range_stops_at_last_year() {
        let last = Period::new(i32::MAX, 12).unwrap();
        assert_eq!(last.next(), None);

        let from = Period::new(i32::MAX, 11).unwrap();
        assert_eq!(Period::range(from, last), vec![from, last]);
    }

    #[test]
    fn test_outcome_status_tracks_filename() {
        let period = Period::new(2023, 1).unwrap();
        let ok = DownloadOutcome::succeeded(period, vec![], "Jan2023.zip", Some(10), None);
        assert!(ok.is_success());
        assert_eq!(ok.filename(), Some("Jan2023.zip"));

        let failed = DownloadOutcome::failed(period, vec![], "trigger not found");
        assert_eq!(failed.status(), DownloadStatus::Failed);
        assert!(failed.filename().is_none());
        assert_eq!(failed.error(), Some("trigger not found"));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&DownloadStatus::Success).unwrap(), r#""success""#);
        assert_eq!(serde_json::to_string(&DownloadStatus::Failed).unwrap(), r#""failed""#);
    }
}

//! Release rotation tracking
//!
//! The rotation lives in a spreadsheet with one row per release:
//! release, start, end, patch manager, two QE engineers, and an activity
//! column ("This Week" / "Next Week") maintained by the sheet itself.
//! [`RotaSheet`] is the storage seam; [`RotaService`] holds the rules.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error)]
pub enum RotaError {
    #[error("{0} does not match the expected release format `N.NNN.NNN`")]
    InvalidRelease(String),
    #[error("invalid time period: {0}")]
    InvalidTimePeriod(String),
    #[error("invalid value for replace column: {0}")]
    InvalidColumn(String),
    #[error("release {0} not found")]
    ReleaseNotFound(String),
    #[error("sheet error: {0}")]
    Sheet(String),
}

/// Columns that hold people and can be reassigned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotaColumn {
    Pm,
    Qe1,
    Qe2,
}

impl RotaColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotaColumn::Pm => "pm",
            RotaColumn::Qe1 => "qe1",
            RotaColumn::Qe2 => "qe2",
        }
    }

    /// Spreadsheet column letter
    pub fn letter(&self) -> char {
        match self {
            RotaColumn::Pm => 'D',
            RotaColumn::Qe1 => 'E',
            RotaColumn::Qe2 => 'F',
        }
    }
}

impl FromStr for RotaColumn {
    type Err = RotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pm" => Ok(RotaColumn::Pm),
            "qe1" => Ok(RotaColumn::Qe1),
            "qe2" => Ok(RotaColumn::Qe2),
            _ => Err(RotaError::InvalidColumn(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimePeriod {
    ThisWeek,
    NextWeek,
}

impl TimePeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::ThisWeek => "This Week",
            TimePeriod::NextWeek => "Next Week",
        }
    }
}

impl fmt::Display for TimePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimePeriod {
    type Err = RotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let words: Vec<String> = s.split_whitespace().map(str::to_lowercase).collect();
        match words.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            ["this", "week"] => Ok(TimePeriod::ThisWeek),
            ["next", "week"] => Ok(TimePeriod::NextWeek),
            _ => Err(RotaError::InvalidTimePeriod(s.to_string())),
        }
    }
}

/// One sheet row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotaRow {
    pub release: String,
    pub start: String,
    pub end: String,
    pub pm: String,
    pub qe1: String,
    pub qe2: String,
    pub activity: String,
}

impl RotaRow {
    pub fn cell(&self, column: RotaColumn) -> &str {
        match column {
            RotaColumn::Pm => &self.pm,
            RotaColumn::Qe1 => &self.qe1,
            RotaColumn::Qe2 => &self.qe2,
        }
    }

    fn cell_mut(&mut self, column: RotaColumn) -> &mut String {
        match column {
            RotaColumn::Pm => &mut self.pm,
            RotaColumn::Qe1 => &mut self.qe1,
            RotaColumn::Qe2 => &mut self.qe2,
        }
    }
}

/// Spreadsheet storage
#[async_trait]
pub trait RotaSheet: Send + Sync {
    async fn rows(&self) -> Result<Vec<RotaRow>, RotaError>;

    async fn append_row(&self, row: RotaRow) -> Result<(), RotaError>;

    /// Write (or clear, with `None`) one person cell of the row at `index`
    async fn set_cell(
        &self,
        index: usize,
        column: RotaColumn,
        value: Option<String>,
    ) -> Result<(), RotaError>;
}

/// A release to append
#[derive(Debug, Clone, Default)]
pub struct NewRelease {
    pub release: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub pm: Option<String>,
    pub qe1: Option<String>,
    pub qe2: Option<String>,
}

/// Rotation rules over a sheet
#[derive(Clone)]
pub struct RotaService {
    sheet: Arc<dyn RotaSheet>,
}

impl RotaService {
    pub fn new(sheet: Arc<dyn RotaSheet>) -> Self {
        Self { sheet }
    }

    pub async fn add_release(&self, release: NewRelease) -> Result<(), RotaError> {
        validate_release(&release.release)?;
        info!(release = %release.release, "adding release to rota");
        self.sheet
            .append_row(RotaRow {
                release: release.release,
                start: release.start.unwrap_or_default(),
                end: release.end.unwrap_or_default(),
                pm: release.pm.unwrap_or_default(),
                qe1: release.qe1.unwrap_or_default(),
                qe2: release.qe2.unwrap_or_default(),
                activity: String::new(),
            })
            .await
    }

    pub async fn fetch_by_release(&self, release: &str) -> Result<Option<RotaRow>, RotaError> {
        validate_release(release)?;
        let rows = self.sheet.rows().await?;
        Ok(rows.into_iter().find(|r| r.release == release))
    }

    pub async fn fetch_by_time(&self, period: &str) -> Result<Vec<RotaRow>, RotaError> {
        let period: TimePeriod = period.parse()?;
        let rows = self.sheet.rows().await?;
        Ok(rows
            .into_iter()
            .filter(|r| r.activity == period.as_str())
            .collect())
    }

    /// Reassign a person column; `None` clears the cell
    pub async fn replace_user(
        &self,
        release: &str,
        column: &str,
        user: Option<&str>,
    ) -> Result<(), RotaError> {
        validate_release(release)?;
        let column: RotaColumn = column.parse()?;

        let rows = self.sheet.rows().await?;
        let index = rows
            .iter()
            .position(|r| r.release == release)
            .ok_or_else(|| RotaError::ReleaseNotFound(release.to_string()))?;

        debug!(
            release,
            cell = %format!("{}{}", column.letter(), index + 1),
            cleared = user.is_none(),
            "replacing rota cell"
        );
        self.sheet
            .set_cell(index, column, user.map(str::to_string))
            .await
    }
}

/// Release versions look like `4.15.1`: one digit, then two groups of 1-3
pub fn validate_release(release: &str) -> Result<(), RotaError> {
    let parts: Vec<&str> = release.split('.').collect();
    let digits = |s: &str, max: usize| {
        !s.is_empty() && s.len() <= max && s.bytes().all(|b| b.is_ascii_digit())
    };
    match parts.as_slice() {
        [major, minor, patch] if digits(*major, 1) && digits(*minor, 3) && digits(*patch, 3) => {
            Ok(())
        }
        _ => Err(RotaError::InvalidRelease(release.to_string())),
    }
}

/// Check an optional date falls on `day`, returning a user-facing problem
pub fn validate_weekday(date: Option<&str>, day: Weekday) -> Option<String> {
    let date = date.filter(|d| !d.is_empty())?;
    let parsed = match NaiveDate::parse_from_str(date, DATE_FORMAT) {
        Ok(d) => d,
        Err(_) => return Some("Please format the date in the format YYYY-MM-DD.".to_string()),
    };

    if parsed.weekday() == day {
        return None;
    }
    Some(match day {
        Weekday::Mon => "Start date should be a Monday.".to_string(),
        Weekday::Fri => "End date should be a Friday.".to_string(),
        _ => "Day of the week is incorrect".to_string(),
    })
}

/// Start must come strictly before end; unparseable dates are reported elsewhere
pub fn check_date_order(start: Option<&str>, end: Option<&str>) -> Option<String> {
    let start = NaiveDate::parse_from_str(start?, DATE_FORMAT).ok()?;
    let end = NaiveDate::parse_from_str(end?, DATE_FORMAT).ok()?;
    (start >= end).then(|| "End date should be after start date.".to_string())
}

/// All schedule problems for an add, in display order
pub fn schedule_problems(start: Option<&str>, end: Option<&str>) -> Vec<String> {
    [
        validate_weekday(start, Weekday::Mon),
        validate_weekday(end, Weekday::Fri),
        check_date_order(start, end),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Activity label the sheet derives from a row's start date
pub fn activity_for(start: NaiveDate, today: NaiveDate) -> Option<TimePeriod> {
    let this_monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
    let next_monday = this_monday + Duration::days(7);
    if start >= this_monday && start < next_monday {
        Some(TimePeriod::ThisWeek)
    } else if start >= next_monday && start < next_monday + Duration::days(7) {
        Some(TimePeriod::NextWeek)
    } else {
        None
    }
}

/// In-process sheet that fills the activity column on append
#[derive(Default)]
pub struct MemorySheet {
    rows: RwLock<Vec<RotaRow>>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<RotaRow>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }
}

#[async_trait]
impl RotaSheet for MemorySheet {
    async fn rows(&self) -> Result<Vec<RotaRow>, RotaError> {
        Ok(self.rows.read().await.clone())
    }

    async fn append_row(&self, mut row: RotaRow) -> Result<(), RotaError> {
        if row.activity.is_empty() {
            let today = chrono::Local::now().date_naive();
            row.activity = NaiveDate::parse_from_str(&row.start, DATE_FORMAT)
                .ok()
                .and_then(|start| activity_for(start, today))
                .map(|p| p.as_str().to_string())
                .unwrap_or_default();
        }
        self.rows.write().await.push(row);
        Ok(())
    }

    async fn set_cell(
        &self,
        index: usize,
        column: RotaColumn,
        value: Option<String>,
    ) -> Result<(), RotaError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .get_mut(index)
            .ok_or_else(|| RotaError::Sheet(format!("row {} out of range", index + 1)))?;
        *row.cell_mut(column) = value.unwrap_or_default();
        Ok(())
    }
}

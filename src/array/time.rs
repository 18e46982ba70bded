//! Decoding of CF-style time coordinates.

use chrono::{Datelike, NaiveDate, TimeDelta};

use super::{ArrayError, Coordinate};

/// Positions along an axis assigned to groups.
pub(crate) struct Groups {
    /// Distinct labels in ascending order; group `g` has label `labels[g]`.
    pub labels: Vec<u32>,
    /// Group index of each position along the axis.
    pub assignment: Vec<usize>,
}

/// Parse `days since YYYY-MM-DD[ hh:mm:ss]` into its origin date.
fn days_since_origin(units: &str) -> Option<NaiveDate> {
    let rest = units.trim().strip_prefix("days since")?.trim();
    let date = rest.split_whitespace().next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Group the positions of a daily time coordinate by calendar day of year.
pub(crate) fn day_of_year_groups(coord: &Coordinate) -> Result<Groups, ArrayError> {
    let units = coord
        .units
        .as_deref()
        .ok_or_else(|| ArrayError::TimeUnits(String::new()))?;
    let origin = days_since_origin(units).ok_or_else(|| ArrayError::TimeUnits(units.to_string()))?;

    let days = coord
        .values
        .iter()
        .map(|&v| {
            TimeDelta::try_days(v.floor() as i64)
                .and_then(|d| origin.checked_add_signed(d))
                .map(|date| date.ordinal())
                .ok_or_else(|| {
                    ArrayError::TimeUnits(format!("{} (value {} out of range)", units, v))
                })
        })
        .collect::<Result<Vec<u32>, _>>()?;

    let mut labels = days.clone();
    labels.sort_unstable();
    labels.dedup();

    let assignment = days
        .iter()
        .map(|d| labels.binary_search(d).unwrap_or_default())
        .collect();

    Ok(Groups { labels, assignment })
}

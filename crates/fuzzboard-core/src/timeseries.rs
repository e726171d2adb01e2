use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::{Corpus, CoreError};

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub daily: u64,
    pub cumulative: u64,
}

/// Cumulative report count per discovery day, ascending by date.
///
/// Only days with at least one report appear.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CumulativeSeries {
    points: Vec<SeriesPoint>,
}

impl CumulativeSeries {
    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn final_count(&self) -> u64 {
        self.points.last().map_or(0, |point| point.cumulative)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.first().map(|point| point.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.last().map(|point| point.date)
    }
}

pub fn aggregate(corpus: &Corpus) -> Result<CumulativeSeries, CoreError> {
    let mut daily: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for record in corpus {
        *daily.entry(record.opened_date()?).or_default() += 1;
    }

    let mut running = 0_u64;
    let points = daily
        .into_iter()
        .map(|(date, count)| {
            running += count;
            SeriesPoint {
                date,
                daily: count,
                cumulative: running,
            }
        })
        .collect();

    Ok(CumulativeSeries { points })
}

/// Reads the calendar day out of a tracker timestamp.
///
/// Accepts RFC 3339 (normalized to UTC), `YYYY-MM-DD HH:MM[:SS]` with an
/// optional trailing zone abbreviation, and a bare `YYYY-MM-DD`.
pub fn parse_opened_date(raw: &str) -> Result<NaiveDate, CoreError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(CoreError::Parse("opened timestamp is missing".to_owned()));
    }

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc).date_naive());
    }

    let without_zone = strip_zone_abbreviation(value);
    for format in DATETIME_FORMATS {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(without_zone, format) {
            return Ok(timestamp.date());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(without_zone, DATE_FORMAT) {
        return Ok(date);
    }

    Err(CoreError::Parse(format!(
        "opened timestamp '{value}' is not a recognized date"
    )))
}

fn strip_zone_abbreviation(value: &str) -> &str {
    match value.rsplit_once(' ') {
        Some((head, zone))
            if !zone.is_empty() && zone.chars().all(|ch| ch.is_ascii_alphabetic()) =>
        {
            head.trim_end()
        }
        _ => value,
    }
}

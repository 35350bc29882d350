use crate::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

static TIMECODE_RE: OnceLock<Regex> = OnceLock::new();

const FORMAT_HINT: &str = "expected [[H:]MM:]SS, e.g. 00:01:10";

/// `[H:]M:SS` with one or two digit hour and minute groups.
pub fn is_valid_timecode(value: &str) -> bool {
    let re = TIMECODE_RE.get_or_init(|| Regex::new(r"^([0-9]{1,2}:)?[0-9]{1,2}:[0-9]{2}$").unwrap());
    re.is_match(value)
}

pub fn timecode_to_seconds(value: &str) -> Option<u64> {
    if !is_valid_timecode(value) {
        return None;
    }
    value
        .split(':')
        .try_fold(0_u64, |acc, part| Some(acc * 60 + part.parse::<u64>().ok()?))
}

/// Renders whole seconds as `HH:MM:SS`. Fractions are dropped and negative
/// input clamps to zero.
pub fn seconds_to_timecode(total_seconds: f64) -> String {
    let sec = if total_seconds.is_finite() && total_seconds > 0.0 {
        total_seconds.floor() as u64
    } else {
        0
    };
    let h = sec / 3600;
    let m = (sec % 3600) / 60;
    let s = sec % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// A validated clip range. Both ends are always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StoredRange")]
pub struct TimeRange {
    pub start: String,
    pub end: String,
}

/// Raw stored shape; converted through [`TimeRange::new`].
#[derive(Deserialize)]
struct StoredRange {
    start: String,
    end: String,
}

impl TryFrom<StoredRange> for TimeRange {
    type Error = EngineError;

    fn try_from(raw: StoredRange) -> Result<Self> {
        TimeRange::new(&raw.start, &raw.end)
    }
}

impl TimeRange {
    pub fn new(start: &str, end: &str) -> Result<Self> {
        let start = start.trim();
        let end = end.trim();
        for value in [start, end] {
            if !is_valid_timecode(value) {
                return Err(EngineError::validation(format!(
                    "invalid time \"{value}\" ({FORMAT_HINT})"
                )));
            }
        }
        let (Some(start_secs), Some(end_secs)) =
            (timecode_to_seconds(start), timecode_to_seconds(end))
        else {
            return Err(EngineError::validation(format!("invalid time range ({FORMAT_HINT})")));
        };
        if end_secs <= start_secs {
            return Err(EngineError::validation(format!(
                "end time {end} must be after start time {start}"
            )));
        }
        Ok(Self {
            start: start.to_string(),
            end: end.to_string(),
        })
    }

    /// Form input: blank fields count as absent. Both absent means the whole
    /// video; exactly one present is rejected.
    pub fn from_fields(start: Option<&str>, end: Option<&str>) -> Result<Option<Self>> {
        let start = start.map(str::trim).filter(|s| !s.is_empty());
        let end = end.map(str::trim).filter(|s| !s.is_empty());
        match (start, end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Self::new(start, end).map(Some),
            (Some(_), None) | (None, Some(_)) => Err(EngineError::validation(
                "a time range needs both a start and an end time",
            )),
        }
    }

    /// Form fields win over a start time embedded in the URL. The URL value
    /// only fills an empty start next to a supplied end.
    pub fn resolve(
        form_start: Option<&str>,
        form_end: Option<&str>,
        url_start: Option<&str>,
    ) -> Result<Option<Self>> {
        let form_start = form_start.map(str::trim).filter(|s| !s.is_empty());
        let form_end = form_end.map(str::trim).filter(|s| !s.is_empty());
        let start = match (form_start, form_end) {
            (None, Some(_)) => url_start,
            _ => form_start,
        };
        Self::from_fields(start, form_end)
    }

    /// Value for yt-dlp's `--download-sections`.
    pub fn section_arg(&self) -> String {
        format!("*{}-{}", self.start, self.end)
    }
}

//! Core data types shared by the find and fetch paths
//!
//! # Key Types
//!
//! - **`Query`**: A path pattern with an optional time window
//! - **`Interval`** / **`IntervalSet`**: Known data coverage of a leaf
//! - **`NodeRecord`**: One normalized metadata record from a find response
//! - **`BulkSeries`** / **`BulkResult`**: Series returned by one bulk fetch
//! - **`SeriesData`**: The slice of a bulk result belonging to a single leaf
//!
//! # Example
//!
//! ```rust
//! use kuba_federation::types::{Interval, IntervalSet, Query};
//!
//! let query = Query::new("servers.*.cpu").with_range(1000, 2000);
//! assert_eq!(query.start_time, Some(1000));
//!
//! let coverage = IntervalSet::new(vec![
//!     Interval::new(0.0, 10.0).unwrap(),
//!     Interval::new(5.0, 20.0).unwrap(),
//! ]);
//! assert_eq!(coverage.len(), 1);
//! assert!(coverage.contains(15.0));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// A find/fetch query against a remote backend
///
/// Times are epoch seconds. `None` means the side is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Query {
    /// Glob-style path pattern (e.g. `servers.*.cpu`)
    pub pattern: String,

    /// Lower bound, epoch seconds
    pub start_time: Option<i64>,

    /// Upper bound, epoch seconds
    pub end_time: Option<i64>,
}

impl Query {
    /// Create an unbounded query for a pattern
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            start_time: None,
            end_time: None,
        }
    }

    /// Bound the query on both sides
    pub fn with_range(mut self, start_time: i64, end_time: i64) -> Self {
        self.start_time = Some(start_time);
        self.end_time = Some(end_time);
        self
    }

    /// Set only the lower bound
    pub fn with_start(mut self, start_time: i64) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Set only the upper bound
    pub fn with_end(mut self, end_time: i64) -> Self {
        self.end_time = Some(end_time);
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Query: {}", self.pattern)?;
        if let Some(start) = self.start_time {
            write!(f, " from {}", start)?;
        }
        if let Some(end) = self.end_time {
            write!(f, " until {}", end)?;
        }
        write!(f, ">")
    }
}

/// Half-open time interval `[start, end)` in epoch seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Inclusive start
    pub start: f64,
    /// Exclusive end
    pub end: f64,
}

impl Interval {
    /// Create an interval, rejecting `start > end` and NaN bounds
    pub fn new(start: f64, end: f64) -> Result<Self, String> {
        if start.is_nan() || end.is_nan() {
            return Err("Interval bounds must be numbers".to_string());
        }
        if start > end {
            return Err(format!("Invalid interval: start {} > end {}", start, end));
        }
        Ok(Self { start, end })
    }

    /// Length of the interval in seconds
    pub fn size(&self) -> f64 {
        self.end - self.start
    }

    /// Check if a timestamp falls within `[start, end)`
    pub fn contains(&self, timestamp: f64) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// Check if two intervals share any time
    pub fn intersects(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Normalized set of intervals: sorted, non-overlapping, non-adjacent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// Build a set, merging overlapping and touching intervals
    pub fn new(mut intervals: Vec<Interval>) -> Self {
        intervals.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut merged: Vec<Interval> = Vec::with_capacity(intervals.len());
        for interval in intervals {
            match merged.last_mut() {
                Some(last) if interval.start <= last.end => {
                    if interval.end > last.end {
                        last.end = interval.end;
                    }
                }
                _ => merged.push(interval),
            }
        }

        Self { intervals: merged }
    }

    /// Build a set from raw `(start, end)` pairs
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Result<Self, String> {
        let intervals = pairs
            .iter()
            .map(|&(start, end)| Interval::new(start, end))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(intervals))
    }

    /// Empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Iterate over the normalized intervals
    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.intervals.iter()
    }

    /// Number of disjoint intervals
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// True if no coverage is known
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Total covered seconds
    pub fn size(&self) -> f64 {
        self.intervals.iter().map(Interval::size).sum()
    }

    /// Check if a timestamp is covered
    pub fn contains(&self, timestamp: f64) -> bool {
        self.intervals.iter().any(|i| i.contains(timestamp))
    }

    /// Check if any covered interval overlaps `other`
    pub fn intersects(&self, other: &Interval) -> bool {
        self.intervals.iter().any(|i| i.intersects(other))
    }

    /// Convert back to `(start, end)` pairs
    pub fn to_pairs(&self) -> Vec<(f64, f64)> {
        self.intervals.iter().map(|i| (i.start, i.end)).collect()
    }
}

/// Time axis of a returned series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeInfo {
    /// First timestamp, epoch seconds
    pub start: i64,
    /// End timestamp, epoch seconds
    pub end: i64,
    /// Seconds between values
    pub step: i64,
}

/// Data for one leaf: time axis plus values, `None` where absent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesData {
    /// Time axis
    pub time_info: TimeInfo,
    /// One value per step
    pub values: Vec<Option<f64>>,
}

/// One series record inside a bulk fetch response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSeries {
    /// Series path
    pub name: String,
    /// First timestamp
    pub start: i64,
    /// End timestamp
    pub end: i64,
    /// Step in seconds
    pub step: i64,
    /// Values, null where absent
    pub values: Vec<Option<f64>>,
}

impl BulkSeries {
    /// Project into the per-leaf shape
    pub fn to_series_data(&self) -> SeriesData {
        SeriesData {
            time_info: TimeInfo {
                start: self.start,
                end: self.end,
                step: self.step,
            },
            values: self.values.clone(),
        }
    }
}

/// Result of one physical bulk fetch, shared read-only by every leaf
/// reader coalesced onto it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BulkResult {
    /// Series in response order
    pub series: Vec<BulkSeries>,
}

impl BulkResult {
    /// Wrap a list of series
    pub fn new(series: Vec<BulkSeries>) -> Self {
        Self { series }
    }

    /// Extract the series whose name equals `path`
    ///
    /// Returns `None` when the backend omitted the series; partial coverage
    /// across time ranges is expected and is not an error.
    pub fn series_for(&self, path: &str) -> Option<SeriesData> {
        self.series
            .iter()
            .find(|s| s.name == path)
            .map(BulkSeries::to_series_data)
    }

    /// Number of series
    pub fn len(&self) -> usize {
        self.series.len()
    }

    /// True if the response carried no series
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Normalized metadata record, the form stored in the find cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Full metric path
    pub path: String,
    /// True for fetchable series
    pub is_leaf: bool,
    /// Coverage as `(start, end)` pairs
    #[serde(default)]
    pub intervals: Vec<(f64, f64)>,
}

/// Metadata record as it arrives on the wire
///
/// Backends speak one of two schemas: the current one (`path`, `is_leaf`)
/// and the legacy one (`metric_path`, `isLeaf`). Both are accepted for good.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawNodeRecord {
    /// Current schema path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Current schema leaf flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_leaf: Option<bool>,

    /// Legacy schema path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_path: Option<String>,

    /// Legacy schema leaf flag
    #[serde(
        default,
        rename = "isLeaf",
        skip_serializing_if = "Option::is_none"
    )]
    pub legacy_is_leaf: Option<bool>,

    /// Coverage as `[start, end]` pairs (both schemas)
    #[serde(default)]
    pub intervals: Vec<(f64, f64)>,
}

impl RawNodeRecord {
    /// True if the record uses the legacy field names
    pub fn is_legacy(&self) -> bool {
        self.legacy_is_leaf.is_some()
    }

    /// Rewrite legacy fields into current ones and validate
    pub fn normalize(self) -> Result<NodeRecord, String> {
        let (path, is_leaf) = if let Some(is_leaf) = self.legacy_is_leaf {
            let path = self
                .metric_path
                .ok_or_else(|| "legacy record without metric_path".to_string())?;
            (path, is_leaf)
        } else {
            let path = self
                .path
                .ok_or_else(|| "record without path".to_string())?;
            (path, self.is_leaf.unwrap_or(false))
        };

        // Validate eagerly so a bad record fails the whole response
        IntervalSet::from_pairs(&self.intervals)?;

        Ok(NodeRecord {
            path,
            is_leaf,
            intervals: self.intervals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_display() {
        let q = Query::new("a.b.*").with_range(10, 20);
        assert_eq!(q.to_string(), "<Query: a.b.* from 10 until 20>");
        assert_eq!(Query::new("x").to_string(), "<Query: x>");
    }

    #[test]
    fn test_interval_validation() {
        assert!(Interval::new(10.0, 5.0).is_err());
        assert!(Interval::new(f64::NAN, 5.0).is_err());
        assert!(Interval::new(5.0, 5.0).is_ok());
    }

    #[test]
    fn test_interval_half_open() {
        let i = Interval::new(100.0, 200.0).unwrap();
        assert!(i.contains(100.0));
        assert!(!i.contains(200.0));
    }

    #[test]
    fn test_interval_set_merges() {
        let set = IntervalSet::from_pairs(&[(30.0, 40.0), (0.0, 10.0), (10.0, 20.0), (35.0, 50.0)])
            .unwrap();
        assert_eq!(set.to_pairs(), vec![(0.0, 20.0), (30.0, 50.0)]);
        assert_eq!(set.size(), 40.0);
        assert!(!set.contains(25.0));
        assert!(set.intersects(&Interval::new(45.0, 60.0).unwrap()));
    }

    #[test]
    fn test_bulk_result_lookup() {
        let result = BulkResult::new(vec![BulkSeries {
            name: "a.cpu".to_string(),
            start: 0,
            end: 60,
            step: 30,
            values: vec![Some(1.0), None],
        }]);
        let data = result.series_for("a.cpu").unwrap();
        assert_eq!(data.time_info, TimeInfo { start: 0, end: 60, step: 30 });
        assert_eq!(data.values, vec![Some(1.0), None]);
        assert!(result.series_for("b.cpu").is_none());
    }

    #[test]
    fn test_legacy_record_normalizes() {
        let legacy: RawNodeRecord = serde_json::from_str(
            r#"{"metric_path": "a.b", "isLeaf": true, "intervals": [[1, 2]]}"#,
        )
        .unwrap();
        let modern: RawNodeRecord =
            serde_json::from_str(r#"{"path": "a.b", "is_leaf": true, "intervals": [[1, 2]]}"#)
                .unwrap();
        assert!(legacy.is_legacy());
        assert!(!modern.is_legacy());
        assert_eq!(legacy.normalize().unwrap(), modern.normalize().unwrap());
    }

    #[test]
    fn test_record_without_path_rejected() {
        let raw: RawNodeRecord = serde_json::from_str(r#"{"is_leaf": true}"#).unwrap();
        assert!(raw.normalize().is_err());

        let raw: RawNodeRecord = serde_json::from_str(r#"{"isLeaf": false, "path": "x"}"#).unwrap();
        assert!(raw.normalize().is_err());
    }

    #[test]
    fn test_branch_record_defaults() {
        let raw: RawNodeRecord = serde_json::from_str(r#"{"path": "servers"}"#).unwrap();
        let record = raw.normalize().unwrap();
        assert!(!record.is_leaf);
        assert!(record.intervals.is_empty());
    }
}

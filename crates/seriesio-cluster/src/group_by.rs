//! Group-by aggregation executors
//!
//! An executor is registered once per queried series and then asked to
//! aggregate successive `[start, end)` time windows. Windows may arrive in
//! any order, so the executor keeps the full filtered point set and scans
//! the requested range per call.

use crate::rpc::{AggregateResult, AggregationType};
use seriesio_common::TimeValuePair;

/// Window aggregator over one series' filtered points.
pub struct GroupByExecutor {
    /// Points matching the query's base filter, ordered by timestamp
    points: Vec<TimeValuePair>,
    aggregations: Vec<AggregationType>,
}

impl GroupByExecutor {
    #[must_use]
    pub fn new(points: Vec<TimeValuePair>, aggregations: Vec<AggregationType>) -> Self {
        Self {
            points,
            aggregations,
        }
    }

    /// Aggregate the window `[start, end)`. Results are parallel to the
    /// registered aggregation list; an empty window yields `None` values.
    #[must_use]
    pub fn calculate(&self, start: i64, end: i64) -> Vec<AggregateResult> {
        let window: Vec<&TimeValuePair> = self
            .points
            .iter()
            .filter(|p| p.timestamp >= start && p.timestamp < end)
            .collect();
        self.aggregations
            .iter()
            .map(|&aggregation| AggregateResult {
                aggregation,
                value: aggregate(aggregation, &window),
            })
            .collect()
    }
}

fn aggregate(kind: AggregationType, window: &[&TimeValuePair]) -> Option<f64> {
    let (first, last) = match (window.first(), window.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return None,
    };
    let values = || window.iter().filter_map(|p| p.value.as_f64());
    match kind {
        AggregationType::Count => Some(window.len() as f64),
        AggregationType::Sum => Some(values().sum()),
        AggregationType::Avg => Some(values().sum::<f64>() / window.len() as f64),
        AggregationType::FirstValue => first.value.as_f64(),
        AggregationType::LastValue => last.value.as_f64(),
        AggregationType::MinTime => Some(first.timestamp as f64),
        AggregationType::MaxTime => Some(last.timestamp as f64),
        AggregationType::MinValue => values().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.min(v)))
        }),
        AggregationType::MaxValue => values().fold(None, |acc: Option<f64>, v| {
            Some(acc.map_or(v, |a| a.max(v)))
        }),
    }
}

/// Merge partial results of the same aggregation from several groups into
/// one final value. Count and Sum add up; Avg needs the matching counts;
/// extremes take the extreme; First/Last follow Min/MaxTime.
#[must_use]
pub fn merge_results(
    kind: AggregationType,
    partials: &[AggregateResult],
    counts: &[Option<f64>],
    times: &[Option<f64>],
) -> Option<f64> {
    let present: Vec<(usize, f64)> = partials
        .iter()
        .enumerate()
        .filter_map(|(i, r)| r.value.map(|v| (i, v)))
        .collect();
    if present.is_empty() {
        return None;
    }
    match kind {
        AggregationType::Count | AggregationType::Sum => {
            Some(present.iter().map(|(_, v)| v).sum())
        }
        AggregationType::Avg => {
            let mut total = 0.0;
            let mut n = 0.0;
            for &(i, v) in &present {
                let c = counts.get(i).copied().flatten()?;
                total += v * c;
                n += c;
            }
            if n == 0.0 { None } else { Some(total / n) }
        }
        AggregationType::MinValue | AggregationType::MinTime => present
            .iter()
            .map(|(_, v)| *v)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v)))),
        AggregationType::MaxValue | AggregationType::MaxTime => present
            .iter()
            .map(|(_, v)| *v)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v)))),
        AggregationType::FirstValue => present
            .iter()
            .filter_map(|&(i, v)| times.get(i).copied().flatten().map(|t| (t, v)))
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, v)| v),
        AggregationType::LastValue => present
            .iter()
            .filter_map(|&(i, v)| times.get(i).copied().flatten().map(|t| (t, v)))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, v)| v),
    }
}

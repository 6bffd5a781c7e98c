pub mod sample;
pub mod sketch;

use crate::types::{PredicateOp, TupleValue};

use self::sample::ReservoirSample;
use self::sketch::DistinctSketch;

/*
    Column statistics are maintained online while rows are appended: a
    HyperLogLog sketch for the distinct count, min/max bounds, the null
    count, the accumulated value bytes (for averaging variable width
    columns) and a reservoir sample. Selectivity estimation first consults
    the sample and falls back to the min/max bounds and the distinct count,
    so it works for all predicate forms without histograms.
*/

pub const SAMPLE_SIZE: usize = 1024;

#[derive(Debug, Clone)]
pub struct ColumnStatistics {
    distinct: DistinctSketch,
    min: Option<TupleValue>,
    max: Option<TupleValue>,
    null_count: u64,
    non_null_count: u64,
    total_value_bytes: u64,
    sample: ReservoirSample,
}

impl ColumnStatistics {
    pub fn new() -> ColumnStatistics {
        ColumnStatistics {
            distinct: DistinctSketch::new(),
            min: None,
            max: None,
            null_count: 0,
            non_null_count: 0,
            total_value_bytes: 0,
            sample: ReservoirSample::new(SAMPLE_SIZE),
        }
    }

    pub fn observe(&mut self, value: &Option<TupleValue>) {
        let value = match value {
            Some(value) => value,
            None => {
                self.null_count += 1;
                return;
            }
        };
        self.non_null_count += 1;
        self.total_value_bytes += value.byte_size() as u64;
        self.distinct.add(value.hash_64());
        if self.min.as_ref().map(|m| value < m).unwrap_or(true) {
            self.min = Some(value.clone());
        }
        if self.max.as_ref().map(|m| value > m).unwrap_or(true) {
            self.max = Some(value.clone());
        }
        self.sample.observe(value);
    }

    pub fn distinct_count(&self) -> u64 {
        self.distinct.estimate()
    }

    pub fn null_count(&self) -> u64 {
        self.null_count
    }

    pub fn min(&self) -> Option<&TupleValue> {
        self.min.as_ref()
    }

    pub fn max(&self) -> Option<&TupleValue> {
        self.max.as_ref()
    }

    /// Average payload width in bytes, rounded up. Fixed width callers
    /// usually bypass this with the declared type size.
    pub fn average_byte_width(&self) -> u64 {
        if self.non_null_count == 0 {
            0
        } else {
            (self.total_value_bytes + self.non_null_count - 1) / self.non_null_count
        }
    }

    pub fn sample(&self) -> &ReservoirSample {
        &self.sample
    }
}

/// Expected fraction of rows matching `op literal` on a column with the
/// given statistics. Returns a value in [0, 1]; 1.0 is the "no estimated
/// benefit" convention for predicates the summary cannot judge, including
/// columns without any stored summary.
pub fn estimate_selectivity(
    stats: &ColumnStatistics,
    row_count: u64,
    op: PredicateOp,
    literal: Option<&TupleValue>,
) -> f32 {
    if row_count == 0 || (stats.non_null_count == 0 && stats.null_count == 0) {
        return 1.0;
    }
    match op {
        PredicateOp::IsNull => (stats.null_count as f64 / row_count as f64) as f32,
        PredicateOp::Equals => match literal {
            Some(literal) => equals_selectivity(stats, literal),
            None => 1.0,
        },
        PredicateOp::NotEquals => match literal {
            Some(literal) => 1.0 - equals_selectivity(stats, literal),
            None => 1.0,
        },
        PredicateOp::LessThan | PredicateOp::LessThanOrEquals
        | PredicateOp::GreaterThan | PredicateOp::GreaterThanOrEquals => match literal {
            Some(literal) => range_selectivity(stats, op, literal),
            None => 1.0,
        },
        // Only the lower bound is recorded, so assume the range covers
        // half of the upper tail beyond it.
        PredicateOp::Between => match literal {
            Some(literal) => {
                0.5 * range_selectivity(stats, PredicateOp::GreaterThanOrEquals, literal)
            }
            None => 1.0,
        },
        PredicateOp::Like => match literal {
            Some(TupleValue::String(pattern)) => like_selectivity(stats, pattern),
            _ => 1.0,
        },
    }
}

fn equals_selectivity(stats: &ColumnStatistics, literal: &TupleValue) -> f32 {
    if let (Some(min), Some(max)) = (stats.min.as_ref(), stats.max.as_ref()) {
        if literal < min || literal > max {
            return 0.0;
        }
    }
    if let Some(fraction) = stats.sample.fraction_matching(|v| v == literal) {
        if fraction > 0.0 {
            return fraction;
        }
    }
    let distinct = stats.distinct_count();
    if distinct == 0 {
        1.0
    } else {
        (1.0 / distinct as f64) as f32
    }
}

fn range_selectivity(stats: &ColumnStatistics, op: PredicateOp, literal: &TupleValue) -> f32 {
    let matches = |v: &TupleValue| match op {
        PredicateOp::LessThan => v < literal,
        PredicateOp::LessThanOrEquals => v <= literal,
        PredicateOp::GreaterThan => v > literal,
        PredicateOp::GreaterThanOrEquals => v >= literal,
        _ => unreachable!(),
    };
    // Numeric columns interpolate on the min/max bounds, everything else
    // falls back to the sample.
    if let (Some(min), Some(max), Some(value)) = (
        stats.min.as_ref().and_then(|v| v.as_f64()),
        stats.max.as_ref().and_then(|v| v.as_f64()),
        literal.as_f64(),
    ) {
        let below = if max > min {
            ((value - min) / (max - min)).clamp(0.0, 1.0)
        } else if value >= min {
            1.0
        } else {
            0.0
        };
        return match op {
            PredicateOp::LessThan | PredicateOp::LessThanOrEquals => below as f32,
            _ => (1.0 - below) as f32,
        };
    }
    stats.sample.fraction_matching(matches).unwrap_or(1.0)
}

fn like_selectivity(stats: &ColumnStatistics, pattern: &str) -> f32 {
    // A leading wildcard defeats any index and any summary: report 1.0 so
    // the predicate contributes no estimated benefit.
    if pattern.starts_with('%') || pattern.starts_with('_') {
        return 1.0;
    }
    let prefix: String = pattern.chars().take_while(|c| *c != '%' && *c != '_').collect();
    let fraction = stats.sample.fraction_matching(|v| match v {
        TupleValue::String(s) => s.starts_with(&prefix),
        _ => false,
    });
    match fraction {
        Some(fraction) if fraction > 0.0 => fraction,
        _ => {
            let distinct = stats.distinct_count();
            if distinct == 0 {
                1.0
            } else {
                (1.0 / distinct as f64) as f32
            }
        }
    }
}

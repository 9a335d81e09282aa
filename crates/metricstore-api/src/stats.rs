//! Summary statistics over a query's returned samples.

use metricstore_core::MetricValue;

use crate::types::Stats;

/// Computes min/avg/max over the non-`NaN` samples in `data`. Returns
/// `None` if every sample is `NaN`.
pub fn compute(data: &[MetricValue]) -> Option<Stats> {
    let mut min = f32::INFINITY;
    let mut max = f32::NEG_INFINITY;
    let mut sum = 0.0f32;
    let mut count = 0usize;

    for value in data {
        if value.is_nan() {
            continue;
        }
        let v = value.get();
        min = min.min(v);
        max = max.max(v);
        sum += v;
        count += 1;
    }

    if count == 0 {
        None
    } else {
        Some(Stats {
            min,
            avg: sum / count as f32,
            max,
        })
    }
}

pub fn scale(stats: Stats, factor: f32) -> Stats {
    Stats {
        min: stats.min * factor,
        avg: stats.avg * factor,
        max: stats.max * factor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn computes_min_avg_max_ignoring_nan() {
        let data = vec![
            MetricValue::new(1.0),
            MetricValue::NAN,
            MetricValue::new(3.0),
        ];
        let stats = compute(&data).unwrap();
        assert_eq!(stats, Stats { min: 1.0, avg: 2.0, max: 3.0 });
    }

    #[test]
    fn all_nan_yields_none() {
        assert!(compute(&[MetricValue::NAN, MetricValue::NAN]).is_none());
    }
}

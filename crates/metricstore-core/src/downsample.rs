//! Largest-Triangle-Three-Buckets downsampling for query responses that ask
//! for a coarser time resolution than a buffer's native sampling frequency.

use crate::value::MetricValue;

/// A `(timestamp, value)` pair, as consumed and produced by [`lttb`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub ts: i64,
    pub value: MetricValue,
}

/// Resolves a caller's requested resolution `want` (same units as
/// `frequency`, e.g. milliseconds between samples) to the actual resolution
/// the store will produce: the smallest multiple of `frequency` that is at
/// least `want`, floored at `frequency` itself (never coarser than asked,
/// never finer than the native sampling rate). `want == 0` disables
/// downsampling, so the actual resolution is just the native `frequency`.
pub fn resolve_resolution(want: usize, frequency: i64) -> i64 {
    if want == 0 || frequency <= 0 {
        return frequency;
    }
    let want = want as i64;
    if want <= frequency {
        return frequency;
    }
    frequency * ((want - 1) / frequency + 1)
}

/// Downsamples `points` (sampled at `frequency`) to `resolution` using the
/// Largest-Triangle-Three-Buckets algorithm, where `resolution` is a
/// multiple of `frequency` as returned by [`resolve_resolution`]. Buckets
/// are fixed-width: `resolution / frequency` source samples per bucket,
/// rather than a fixed output point count. `NaN` values are treated as zero
/// for the triangle-area comparison (area, not the sample itself, only ever
/// decides which point is picked) but are returned unmodified if selected.
///
/// Returns `points` unchanged if the bucket width collapses to a single
/// sample (native resolution) or there are too few points to form interior
/// buckets.
pub fn lttb(points: &[Point], frequency: i64, resolution: i64) -> Vec<Point> {
    let n = points.len();
    let bucket_width = if frequency <= 0 { 1 } else { (resolution / frequency).max(1) as usize };
    if bucket_width <= 1 || n <= 2 {
        return points.to_vec();
    }

    let num_buckets = n.div_ceil(bucket_width);
    if num_buckets <= 2 {
        return points.to_vec();
    }

    let mut sampled = Vec::with_capacity(num_buckets);
    sampled.push(points[0]);
    let mut a = 0usize;

    for i in 1..num_buckets - 1 {
        let bucket_start = (i * bucket_width).min(n - 1);
        let bucket_end = ((i + 1) * bucket_width).min(n - 1);

        let next_start = bucket_end;
        let next_end = ((i + 2) * bucket_width).min(n);
        let avg_range = next_start..next_end.max(next_start + 1).min(n);
        let (avg_ts, avg_value) = average(points, avg_range);

        let point_a = points[a];
        let mut max_area = -1.0f64;
        let mut max_idx = bucket_start;

        for idx in bucket_start..bucket_end.max(bucket_start + 1).min(n) {
            let area = triangle_area(point_a, points[idx], avg_ts, avg_value);
            if area > max_area {
                max_area = area;
                max_idx = idx;
            }
        }

        sampled.push(points[max_idx]);
        a = max_idx;
    }

    sampled.push(points[n - 1]);
    sampled
}

fn average(points: &[Point], range: std::ops::Range<usize>) -> (f64, f64) {
    let range = range.start.min(points.len())..range.end.min(points.len());
    if range.is_empty() {
        let last = points.last().expect("caller guarantees non-empty points");
        return (last.ts as f64, value_or_zero(last.value));
    }
    let count = range.len() as f64;
    let (sum_ts, sum_v) = points[range].iter().fold((0.0, 0.0), |(ts_acc, v_acc), p| {
        (ts_acc + p.ts as f64, v_acc + value_or_zero(p.value))
    });
    (sum_ts / count, sum_v / count)
}

fn value_or_zero(v: MetricValue) -> f64 {
    if v.is_nan() {
        0.0
    } else {
        v.get() as f64
    }
}

fn triangle_area(a: Point, b: Point, avg_ts: f64, avg_value: f64) -> f64 {
    let (ax, ay) = (a.ts as f64, value_or_zero(a.value));
    let (bx, by) = (b.ts as f64, value_or_zero(b.value));
    ((ax - avg_ts) * (by - ay) - (ax - bx) * (avg_value - ay)).abs() * 0.5
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(vals: &[f32]) -> Vec<Point> {
        vals.iter()
            .enumerate()
            .map(|(i, &v)| Point {
                ts: i as i64 * 10,
                value: MetricValue::new(v),
            })
            .collect()
    }

    #[test]
    fn resolve_resolution_rounds_up_to_a_multiple_of_frequency() {
        assert_eq!(resolve_resolution(10, 10), 10);
        assert_eq!(resolve_resolution(25, 10), 30);
        assert_eq!(resolve_resolution(1, 10), 10);
        assert_eq!(resolve_resolution(0, 10), 10);
    }

    #[test]
    fn two_sample_seed_scenario_keeps_native_resolution() {
        // freq=10, 2 samples, wantResolution=10 -> actualRes=10, data unchanged.
        let resolution = resolve_resolution(10, 10);
        assert_eq!(resolution, 10);
        let input = pts(&[1.0, 2.0]);
        let out = lttb(&input, 10, resolution);
        assert_eq!(out, input);
    }

    #[test]
    fn keeps_first_and_last() {
        let input = pts(&[1.0, 5.0, 2.0, 8.0, 3.0, 9.0, 1.0, 4.0, 6.0, 2.0]);
        let resolution = resolve_resolution(40, 10);
        let out = lttb(&input, 10, resolution);
        assert_eq!(out.first(), input.first());
        assert_eq!(out.last(), input.last());
        assert!(out.len() < input.len());
    }

    #[test]
    fn shorter_than_bucket_width_is_unchanged() {
        let input = pts(&[1.0, 2.0, 3.0]);
        let resolution = resolve_resolution(1000, 10);
        let out = lttb(&input, 10, resolution);
        assert_eq!(out, input);
    }

    #[test]
    fn output_shrinks_with_wider_buckets() {
        let input = pts(&(0..100).map(|i| i as f32).collect::<Vec<_>>());
        let resolution = resolve_resolution(50, 10);
        assert_eq!(resolution, 50);
        let out = lttb(&input, 10, resolution);
        assert_eq!(out.len(), 100usize.div_ceil(5));
    }
}

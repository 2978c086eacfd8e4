//! Numeric helpers kept pure so interaction and render code stays small.

/// Clamp a value into `[min, max]`, tolerating NaN by returning `min`.
pub fn clamp_f32(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

/// Clamp a fraction into the normalized `0.0..=1.0` range.
pub fn clamp_fraction(value: f32) -> f32 {
    clamp_f32(value, 0.0, 1.0)
}

/// Inclusive-start, exclusive-end bounds of chunk `index` when splitting
/// `total` items into fixed-size chunks.
pub fn chunk_bounds(total: usize, chunk_size: usize, index: usize) -> (usize, usize) {
    let chunk_size = chunk_size.max(1);
    let start = index.saturating_mul(chunk_size).min(total);
    let end = start.saturating_add(chunk_size).min(total);
    (start, end)
}

/// Number of fixed-size chunks needed to cover `total` items.
pub fn chunk_count(total: usize, chunk_size: usize) -> usize {
    total.div_ceil(chunk_size.max(1))
}

/// Linear interpolation between `a` and `b` by `t` in `0.0..=1.0`.
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * clamp_fraction(t)
}

/// Running (min, max) fold over a sample slice, clamped to `[-1, 1]`.
pub fn min_max(samples: &[f32]) -> (f32, f32) {
    let mut min = 1.0_f32;
    let mut max = -1.0_f32;
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        min = min.min(clamped);
        max = max.max(clamped);
    }
    if min > max {
        (0.0, 0.0)
    } else {
        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_bounds_cover_total_without_gaps() {
        let total = 10;
        let size = 4;
        let mut covered = 0;
        for index in 0..chunk_count(total, size) {
            let (start, end) = chunk_bounds(total, size, index);
            assert_eq!(start, covered);
            covered = end;
        }
        assert_eq!(covered, total);
    }

    #[test]
    fn chunk_bounds_clamp_past_the_end() {
        assert_eq!(chunk_bounds(3, 4, 5), (3, 3));
    }

    #[test]
    fn clamp_handles_nan() {
        assert_eq!(clamp_f32(f32::NAN, 0.0, 1.0), 0.0);
    }

    #[test]
    fn min_max_clamps_and_orders() {
        assert_eq!(min_max(&[2.0, -3.0, 0.5]), (-1.0, 1.0));
        assert_eq!(min_max(&[]), (0.0, 0.0));
    }
}

use super::{Center, Resolution};

/// Enumerates `(row, col)` pixel coordinates whose distance from `center`
/// falls in `[radius - half_width, radius + half_width]`, within the bounds
/// of `resolution`. Shared by the center finder (symmetry scoring) and,
/// conceptually, by the angular average's per-radius binning (which instead
/// buckets every pixel by its rounded integer radius in one pass -- see
/// `crate::angular`).
pub fn ring_pixels(
    resolution: Resolution,
    center: Center,
    radius: f64,
    half_width: f64,
) -> Vec<(usize, usize)> {
    let lo = (radius - half_width).max(0.0);
    let hi = radius + half_width;
    let mut out = Vec::new();
    for row in 0..resolution.height {
        for col in 0..resolution.width {
            let rho = center.radius_to(row, col);
            if rho >= lo && rho <= hi {
                out.push((row, col));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_pixels_within_band() {
        let res = Resolution::new(64, 64);
        let center = Center::new(32.0, 32.0);
        let pixels = ring_pixels(res, center, 10.0, 1.0);
        assert!(!pixels.is_empty());
        for (row, col) in &pixels {
            let rho = center.radius_to(*row, *col);
            assert!((9.0..=11.0).contains(&rho));
        }
    }
}

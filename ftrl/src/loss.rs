/// Probabilities are clamped to `[EPS, 1 - EPS]` before taking logs.
pub const EPS: f64 = 1e-15;

/// Weighted binary cross-entropy of prediction `p` for label `y`. A NaN
/// prediction gives a NaN loss.
pub fn logloss(p: f64, y: u8, w: f64) -> f64 {
    let p = p.clamp(EPS, 1.0 - EPS);
    if y == 1 {
        -p.ln() * w
    } else {
        -(1.0 - p).ln() * w
    }
}

/// Clamps `v` to `[-bound, bound]`.
pub fn clip(v: f64, bound: f64) -> f64 {
    if v > bound {
        bound
    } else if v < -bound {
        -bound
    } else {
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logloss_is_finite_at_the_boundaries() {
        for &p in &[0.0, 1.0] {
            for &y in &[0, 1] {
                let l = logloss(p, y, 1.0);
                assert!(l.is_finite() && l >= 0.0, "p={} y={} loss={}", p, y, l);
            }
        }
        assert!((logloss(0.0, 1, 1.0) + EPS.ln()).abs() < 1e-9);
    }

    #[test]
    fn logloss_keeps_nan() {
        assert!(logloss(f64::NAN, 1, 1.0).is_nan());
        assert!(logloss(f64::NAN, 0, 2.0).is_nan());
    }

    #[test]
    fn logloss_scales_with_weight() {
        let l = logloss(0.5, 1, 2.0);
        assert!((l - 2.0 * std::f64::consts::LN_2).abs() < 1e-12);
        assert_eq!(logloss(0.3, 0, 0.0), 0.0);
    }

    #[test]
    fn clip_bounds() {
        assert_eq!(clip(5.0, 2.0), 2.0);
        assert_eq!(clip(-5.0, 2.0), -2.0);
        assert_eq!(clip(1.5, 2.0), 1.5);
        assert_eq!(clip(1.5, 0.0), 0.0);
    }
}

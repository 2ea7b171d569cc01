//! Angular helpers

/// Signed shortest rotation from `current` to `center`, in degrees.
///
/// The result lies in `(-180, 180]`. Inputs are normalized modulo 360 so any
/// finite value is accepted; non-finite inputs yield 0.
pub fn angle_diff(center: f64, current: f64) -> f64 {
    let raw = center - current;
    if !raw.is_finite() {
        return 0.0;
    }

    // Positive exactly when raw is in [0, 180] or [-360, -180] (mod 360)
    let normalized = raw.rem_euclid(360.0);
    if normalized <= 180.0 {
        normalized
    } else {
        normalized - 360.0
    }
}

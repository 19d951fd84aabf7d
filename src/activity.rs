//! Potency unit conversions.
//!
//! `pIC50` is the negative log10 of the molar IC50; with IC50 in nanomolar
//! this is `pIC50 = 9 - log10(IC50_nM)` and `IC50_nM = 10^(9 - pIC50)`.

use ndarray::{Array1, ArrayView1};

/// Convert a pIC50 value to IC50 in nanomolar.
///
/// ```
/// use ic50::activity::pic50_to_ic50;
///
/// assert_eq!(pic50_to_ic50(9.0), 1.0);
/// assert_eq!(pic50_to_ic50(6.0), 1000.0);
/// ```
pub fn pic50_to_ic50(pic50: f64) -> f64 {
    10f64.powf(9.0 - pic50)
}

/// Convert IC50 in nanomolar to pIC50.
pub fn ic50_to_pic50(ic50_nm: f64) -> f64 {
    9.0 - ic50_nm.log10()
}

/// Element-wise [`pic50_to_ic50`].
pub fn pic50_to_ic50_array(pic50: ArrayView1<'_, f64>) -> Array1<f64> {
    pic50.mapv(pic50_to_ic50)
}

/// Element-wise [`pic50_to_ic50`] over model outputs.
pub fn pic50_to_ic50_all(pic50: &[f32]) -> Vec<f64> {
    pic50.iter().map(|&p| pic50_to_ic50(f64::from(p))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn scalar_anchor_points() {
        assert_eq!(pic50_to_ic50(9.0), 1.0);
        assert_eq!(pic50_to_ic50(6.0), 1000.0);
        assert_eq!(pic50_to_ic50(8.0), 10.0);
        assert_relative_eq!(pic50_to_ic50(7.5), 10f64.powf(1.5));
    }

    #[test]
    fn vectorised_matches_scalar() {
        let p = array![9.0, 6.0, 7.25, 4.0];
        let out = pic50_to_ic50_array(p.view());
        for (x, y) in p.iter().zip(out.iter()) {
            assert_eq!(*y, pic50_to_ic50(*x));
        }
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 1000.0);

        let from_f32 = pic50_to_ic50_all(&[9.0, 6.0]);
        assert_eq!(from_f32, vec![1.0, 1000.0]);
    }

    #[test]
    fn round_trip_through_log() {
        for ic50 in [0.5, 1.0, 37.0, 1000.0, 25_000.0] {
            assert_relative_eq!(pic50_to_ic50(ic50_to_pic50(ic50)), ic50, max_relative = 1e-12);
        }
    }
}

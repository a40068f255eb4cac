//! Small numerical helpers shared by the synthesizer and its consumers.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView2, Axis, Zip};
use num_complex::Complex;

/// Re(E²), the real part of the squared field.
///
/// This is the preview convention for every simulated image. It equals |E|² only where the
/// field is real, and can be negative elsewhere. Use `norm_sqr` for physical power.
pub fn field_to_intensity(field: &Array2<Complex<f64>>) -> Array2<f64> {
    let mut intensity = Array2::zeros(field.raw_dim());
    Zip::from(&mut intensity)
        .and(field)
        .par_for_each(|i, &e| *i = (e * e).re);
    intensity
}

/// Percentile `q` (0 to 100) with linear interpolation between closest ranks.
///
/// Returns `None` for an empty input or if any value is NaN.
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || values.iter().any(|v| v.is_nan()) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (q.max(0.0).min(100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64))
}

/// Display limits `(vmin, vmax)` from a pair of percentiles, e.g. `(0.01, 99.99)`.
pub fn display_range(image: ArrayView2<f64>, (lo, hi): (f64, f64)) -> Option<(f64, f64)> {
    let values: Vec<f64> = image.iter().copied().collect();
    let vmin = percentile(&values, lo)?;
    let vmax = percentile(&values, hi)?;
    log::debug!("vmin:{}, vmax:{}", vmin, vmax);
    Some((vmin, vmax))
}

/// Values `start, start + step, ...` strictly below `stop`.
pub fn arange(start: f64, stop: f64, step: f64) -> Result<Vec<f64>> {
    if !(step > 0.0) || !start.is_finite() || !stop.is_finite() || stop < start {
        return Err(Error::InvalidScan { start, stop, step });
    }
    let count = ((stop - start) / step).ceil() as usize;
    Ok((0..count).map(|i| start + i as f64 * step).collect())
}

/// Packs each row of a binary pattern into bytes, most significant bit first.
///
/// Rows are padded with zero bits to a whole number of bytes.
pub fn pack_bits(pattern: ArrayView2<bool>) -> Array2<u8> {
    let width = (pattern.ncols() + 7) / 8;
    let mut packed = Array2::zeros([pattern.nrows(), width]);
    for (row, mut out) in pattern.axis_iter(Axis(0)).zip(packed.axis_iter_mut(Axis(0))) {
        for (j, &on) in row.iter().enumerate() {
            if on {
                out[j / 8] |= 0x80u8 >> (j % 8);
            }
        }
    }
    packed
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn intensity_is_real_part_of_square() {
        let field = array![[
            Complex::new(3.0, 4.0),
            Complex::new(0.0, -2.0),
            Complex::new(-1.5, 0.0)
        ]];
        assert_eq!(field_to_intensity(&field), array![[-7.0, -4.0, 2.25]]);
    }

    #[test]
    fn percentile_interpolates() {
        let values = [4.0, 1.0, 3.0, 2.0, 5.0];
        assert_relative_eq!(percentile(&values, 0.0).unwrap(), 1.0);
        assert_relative_eq!(percentile(&values, 50.0).unwrap(), 3.0);
        assert_relative_eq!(percentile(&values, 100.0).unwrap(), 5.0);
        assert_relative_eq!(percentile(&values, 12.5).unwrap(), 1.5);
        assert_eq!(percentile(&[], 50.0), None);
        assert_eq!(percentile(&[1.0, f64::NAN], 50.0), None);
    }

    #[test]
    fn display_range_brackets_image() {
        let image = Array2::from_shape_fn([10, 10], |(i, j)| (i * 10 + j) as f64);
        let (vmin, vmax) = display_range(image.view(), (0.0, 100.0)).unwrap();
        assert_eq!((vmin, vmax), (0.0, 99.0));
    }

    #[test]
    fn arange_is_half_open() {
        assert_eq!(arange(-10.0, 10.0, 5.0).unwrap(), vec![-10.0, -5.0, 0.0, 5.0]);
        assert_eq!(arange(0.0, 1.0, 0.4).unwrap().len(), 3);
        assert!(arange(0.0, 0.0, 1.0).unwrap().is_empty());
        assert!(arange(0.0, 1.0, 0.0).is_err());
        assert!(arange(1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn bits_are_packed_msb_first() {
        let pattern = array![
            [true, false, false, false, false, false, false, true, true],
            [false, true, false, false, false, false, false, false, false]
        ];
        let packed = pack_bits(pattern.view());
        assert_eq!(packed, array![[0x81, 0x80], [0x40, 0x00]]);
    }
}

use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{aview_mut1, s, Array2, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis, Zip};
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftDirection, FftPlanner, Length};

/// performs a 2D fft where the 0th component is at the center rather than the normal right
/// equivalent to ifft_shift, fft, then fft_shift on both axes.
pub fn fft2c(mut input: Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    _fft2c(input.view_mut(), FftDirection::Forward);
    input
}

/// performs a 2D ifft where the 0th component is at the center rather than the normal right
/// equivalent to ifft_shift, ifft, then fft_shift on both axes.
pub fn ifft2c(mut input: Array2<Complex<f64>>) -> Array2<Complex<f64>> {
    _fft2c(input.view_mut(), FftDirection::Inverse);
    input
}

/// Unitary normalisation, split so that forward followed by inverse is the identity.
fn _fft2c(mut input: ArrayViewMut2<Complex<f64>>, direction: FftDirection) {
    let normalisation = 1.0 / ((input.shape()[0] * input.shape()[1]) as f64).sqrt();

    let mut planner = FftPlanner::new();
    let fft0 = planner.plan_fft(input.shape()[0], direction);
    let fft1 = planner.plan_fft(input.shape()[1], direction);

    // fft along axis1, iteration over axis0
    transform_lanes(input.view_mut(), Axis(1), &*fft1, 1.0);
    // fft along axis0, iteration over axis1
    transform_lanes(input, Axis(0), &*fft0, normalisation);
}

fn transform_lanes(
    mut input: ArrayViewMut2<Complex<f64>>,
    axis: Axis,
    fft: &dyn Fft<f64>,
    scale: f64,
) {
    Zip::from(input.lanes_mut(axis))
        .into_par_iter()
        .for_each_init(
            || {
                (
                    vec![Zero::zero(); fft.len()],
                    vec![Zero::zero(); fft.get_inplace_scratch_len()],
                )
            },
            |(buffer, scratch), (mut lane,)| {
                // lanes along axis0 are strided, so always work on a contiguous copy
                for (b, &e) in buffer.iter_mut().zip(lane.iter()) {
                    *b = e;
                }
                ifft_shift_inplace(aview_mut1(buffer.as_mut_slice()));
                fft.process_with_scratch(buffer, scratch);
                fft_shift_inplace(aview_mut1(buffer.as_mut_slice()));
                for (e, &b) in lane.iter_mut().zip(buffer.iter()) {
                    *e = b * scale;
                }
            },
        );
}

/// Moves the origin (0) to the "center" of the array (N/2)
///
/// For even array lengths, which have no center value, this moves the value to the next value after the center
pub fn fft_shift_inplace<T: Copy>(mut input: ArrayViewMut1<T>) {
    if input.len() % 2 == 0 {
        return fft_shift_even(input);
    }

    let len = input.len();
    let half = len / 2;

    let mut i = input.len();
    let mut j = half;
    let mut temp1 = input[half];
    for _ in 0..half {
        i -= 1;
        j -= 1;
        std::mem::swap(&mut temp1, &mut input[i]);

        std::mem::swap(&mut temp1, &mut input[j]);
    }
    input[half] = temp1;
}

/// Moves the "center" of the array (N/2) to the origin (0)
///
/// Inverts fft_shift exactly, accounting for the asymmetry of even arrays
pub fn ifft_shift_inplace<T: Copy>(mut input: ArrayViewMut1<T>) {
    if input.len() % 2 == 0 {
        return fft_shift_even(input);
    }

    let len = input.len();
    let half = len / 2;

    let mut j = half + 1;
    let mut temp1 = input[half];
    for i in 0..half {
        std::mem::swap(&mut temp1, &mut input[i]);

        std::mem::swap(&mut temp1, &mut input[j]);

        j += 1;
    }
    input[half] = temp1;
}

fn fft_shift_even<T: Copy>(mut input: ArrayViewMut1<T>) {
    let half = input.len() / 2;
    for i in 0..half {
        input.swap(i, i + half);
    }
}

/// Centered region of `shape` inside `input`. Where the size difference is odd the extra
/// row/column is left on the far side.
pub fn crop_center<T>(input: ArrayView2<'_, T>, shape: [usize; 2]) -> ArrayView2<'_, T> {
    debug_assert!(input.shape()[0] >= shape[0] && input.shape()[1] >= shape[1]);
    let o0 = (input.shape()[0] - shape[0]) / 2;
    let o1 = (input.shape()[1] - shape[1]) / 2;
    input.slice_move(s![o0..o0 + shape[0], o1..o1 + shape[1]])
}

#[cfg(test)]
mod tests {
    use super::{crop_center, fft2c, fft_shift_inplace, ifft2c, ifft_shift_inplace};
    use ndarray::{Array2, ArrayViewMut};
    use rustfft::num_complex::Complex;

    fn assert_eq_vecs(a: &[Complex<f64>], b: &[Complex<f64>]) {
        for (a, b) in a.iter().zip(b) {
            assert!((a - b).norm() < 1e-9, "{}", (a - b).norm());
        }
    }

    fn reals(values: &[f64]) -> Vec<Complex<f64>> {
        values.iter().map(|&x| Complex::new(x, 0.)).collect()
    }

    #[test]
    fn test_fft_shift_odd() {
        let mut input = reals(&[1., 2., 3., 4., 5., 6., 7., 8., 9.]);
        let expected = reals(&[6., 7., 8., 9., 1., 2., 3., 4., 5.]);

        let input_view = ArrayViewMut::from_shape(9, &mut input).unwrap();
        fft_shift_inplace(input_view);

        assert_eq!(input, expected);
    }

    #[test]
    fn test_fft_shift_even() {
        let mut input = vec![1, 2, 3, 4, 5, 6, 7, 8];
        let input_view = ArrayViewMut::from_shape(8, &mut input).unwrap();
        fft_shift_inplace(input_view);

        assert_eq!(input, vec![5, 6, 7, 8, 1, 2, 3, 4]);
    }

    #[test]
    fn test_ifft_shift_odd() {
        let mut input = reals(&[6., 7., 8., 9., 1., 2., 3., 4., 5.]);
        let expected = reals(&[1., 2., 3., 4., 5., 6., 7., 8., 9.]);

        let input_view = ArrayViewMut::from_shape(9, &mut input).unwrap();
        ifft_shift_inplace(input_view);

        assert_eq!(input, expected);
    }

    #[test]
    fn centered_delta_transforms_to_flat_spectrum() {
        for &n in &[7usize, 8] {
            let mut input = Array2::zeros([n, n]);
            input[[n / 2, n / 2]] = Complex::new(1.0, 0.0);
            let output = fft2c(input);
            let flat = vec![Complex::new(1.0 / n as f64, 0.0); n * n];
            assert_eq_vecs(&flat, output.as_slice().unwrap());
        }
    }

    #[test]
    fn flat_field_transforms_to_centered_delta() {
        let input = Array2::from_elem([6, 9], Complex::new(1.0, 0.0));
        let output = ifft2c(input);
        for ((i, j), v) in output.indexed_iter() {
            let expected = if (i, j) == (3, 4) {
                (54f64).sqrt()
            } else {
                0.0
            };
            assert!((v - Complex::new(expected, 0.0)).norm() < 1e-9);
        }
    }

    #[test]
    fn centered_round_trip() {
        let input = Array2::from_shape_fn([5, 8], |(i, j)| {
            Complex::new((i * 8 + j) as f64, (i as f64 - j as f64) * 0.5)
        });
        let output = ifft2c(fft2c(input.clone()));
        assert_eq_vecs(input.as_slice().unwrap(), output.as_slice().unwrap());
    }

    #[test]
    fn crop_is_centered() {
        let input = Array2::from_shape_fn([6, 7], |(i, j)| i * 10 + j);
        let cropped = crop_center(input.view(), [2, 4]);
        assert_eq!(cropped.shape(), &[2, 4]);
        assert_eq!(cropped[[0, 0]], 21);
        assert_eq!(cropped[[1, 3]], 34);
    }
}

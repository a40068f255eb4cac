//! Choosing the cropping factor.
//!
//! A higher cropping factor removes more low amplitude content from the ideal field before
//! binarization. Each candidate is scored by how much of the pattern's power makes it through
//! the pupil mask and by how closely the simulated excitation matches the ideal field.

use crate::error::Result;
use crate::fft2::fft2c;
use crate::synthesizer::{binarize, binary_phase, Synthesizer};
use crate::utils::field_to_intensity;
use ndarray::{Array2, Zip};
use num_complex::Complex;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CfScore {
    pub cf: f64,
    /// Pupil power after the mask over pupil power before it.
    pub passthrough: f64,
    /// Sum of squared differences between the normalized excitation and the ideal intensity,
    /// both as Re(E²). Lower is better.
    pub similarity: f64,
}

/// Scores every cropping factor in `cfs` against the synthesizer's operations and mask.
pub fn sweep_cropping_factor(synth: &mut Synthesizer, cfs: &[f64]) -> Result<Vec<CfScore>> {
    let ideal = synth.ideal_field(false)?;
    let ideal_intensity = ideal.mapv(|v| v * v);
    let mask = synth.calibrate_mask()?;

    cfs.iter()
        .map(|&cf| {
            let pattern = binarize(&ideal, cf);
            let pre_mask = fft2c(binary_phase(&pattern));
            let power_pre = power(&pre_mask);

            let post_mask = mask.apply(pre_mask)?;
            let power_post = power(&post_mask);

            let mut excitation = field_to_intensity(&fft2c(post_mask));
            let peak = excitation.iter().fold(0.0f64, |m, &v| m.max(v));
            if peak > 0.0 {
                excitation.mapv_inplace(|v| v / peak);
            }
            let mut similarity = 0.0;
            Zip::from(&excitation)
                .and(&ideal_intensity)
                .for_each(|&a, &b| similarity += (a - b) * (a - b));

            let score = CfScore {
                cf,
                passthrough: power_post / power_pre,
                similarity,
            };
            log::debug!(
                "cf:{:.4} passthrough:{:.4} similarity:{:.6}",
                score.cf,
                score.passthrough,
                score.similarity
            );
            Ok(score)
        })
        .collect()
}

/// Σ|E|², physical power for the passthrough ratio.
fn power(field: &Array2<Complex<f64>>) -> f64 {
    field.iter().map(|e| e.norm_sqr()).sum()
}

/// The score with the lowest similarity, if any.
pub fn best_cropping_factor(scores: &[CfScore]) -> Option<CfScore> {
    scores
        .iter()
        .filter(|s| s.similarity.is_finite())
        .min_by(|a, b| a.similarity.total_cmp(&b.similarity))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::qxga_like;
    use crate::mask::AnnularMask;
    use crate::ops::Bessel;
    use crate::utils::arange;

    #[test]
    fn sweep_scores_every_factor() {
        let mut field = qxga_like([48, 48]);
        field.register(Bessel::new(3.824, 2.689));
        let mut synth = Synthesizer::new(field, Some(AnnularMask::new(3.824, 2.689)));

        let cfs = arange(0.0, 0.2, 0.05).unwrap();
        let scores = sweep_cropping_factor(&mut synth, &cfs).unwrap();
        assert_eq!(scores.len(), 4);
        for (score, &cf) in scores.iter().zip(&cfs) {
            assert_eq!(score.cf, cf);
            assert!(score.passthrough > 0.0 && score.passthrough <= 1.0 + 1e-12);
            assert!(score.similarity.is_finite() && score.similarity >= 0.0);
        }
        let best = best_cropping_factor(&scores).unwrap();
        assert!(scores.iter().all(|s| best.similarity <= s.similarity));
    }

    #[test]
    fn best_of_nothing() {
        assert_eq!(best_cropping_factor(&[]), None);
    }
}

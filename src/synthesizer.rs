//! Pattern synthesis and forward simulation of the 4f pupil filtering system.

use crate::error::{Error, Result};
use crate::fft2::{fft2c, ifft2c};
use crate::field::Field;
use crate::mask::AnnularMask;
use crate::ops::Composition;
use crate::utils::{arange, field_to_intensity};
use ndarray::parallel::prelude::{IntoParallelRefIterator, ParallelIterator};
use ndarray::{s, Array1, Array2, Axis, Zip};
use num_complex::Complex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Options of [`Synthesizer::slm_pattern`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PatternOptions {
    /// Only binary patterns are supported.
    pub binary: bool,
    /// Cropping factor, normalized amplitudes at or below it are treated as numerical noise.
    pub cf: f64,
    /// Crop the result to the SLM shape.
    pub crop: bool,
    /// Zero the ideal field outside the SLM before binarization.
    pub bounded: bool,
}

impl Default for PatternOptions {
    fn default() -> Self {
        PatternOptions {
            binary: true,
            cf: 0.15,
            crop: true,
            bounded: false,
        }
    }
}

/// Named images produced by [`Synthesizer::simulate`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Uncropped binary pattern, as 0 and 1.
    Pattern,
    /// Pupil plane intensity before the mask.
    PreMask,
    /// Pupil plane intensity after the mask.
    PostMask,
    /// Excitation intensity in the focal plane.
    ExcitationXz,
    /// On-axis lateral profile against axial offset, one column per offset.
    ExcitationXy,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Pattern => "pattern",
            Stage::PreMask => "pre_mask",
            Stage::PostMask => "post_mask",
            Stage::ExcitationXz => "excitation_xz",
            Stage::ExcitationXy => "excitation_xy",
        }
    }
}

/// Options of [`Synthesizer::simulate`].
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationOptions {
    /// Optional stages to compute, only [`Stage::ExcitationXy`] is optional.
    pub views: Vec<Stage>,
    /// Crop every image to the SLM region.
    pub crop: bool,
    /// Half open axial range `[start, stop)` in microns.
    pub z_range: (f64, f64),
    pub z_step: f64,
    /// Pattern generation, always uncropped during simulation.
    pub pattern: PatternOptions,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        SimulationOptions {
            views: Vec::new(),
            crop: false,
            z_range: (-100.0, 100.0),
            z_step: 10.0,
            pattern: PatternOptions::default(),
        }
    }
}

pub type SimulationResults = BTreeMap<Stage, Array2<f64>>;

/// Composes the operations of a [`Field`] into an SLM pattern, and simulates what the pattern
/// produces through a pupil mask.
#[derive(Clone, Debug)]
pub struct Synthesizer {
    field: Field,
    mask: Option<AnnularMask>,
}

impl Synthesizer {
    pub fn new(field: Field, mask: Option<AnnularMask>) -> Self {
        Synthesizer { field, mask }
    }

    pub fn field(&self) -> &Field {
        &self.field
    }

    /// Mutable access for registering operations or changing the system, cached templates are
    /// rebuilt on the next evaluation.
    pub fn field_mut(&mut self) -> &mut Field {
        &mut self.field
    }

    pub fn mask(&self) -> Option<&AnnularMask> {
        self.mask.as_ref()
    }

    pub fn set_mask(&mut self, mask: Option<AnnularMask>) {
        self.mask = mask;
    }

    pub fn into_field(self) -> Field {
        self.field
    }

    /// The ideal field in k-space.
    ///
    /// Additive operations are summed first, in registration order, then multiplicative
    /// operations are applied to that sum, also in registration order.
    pub fn compose(&mut self) -> Result<Array2<Complex<f64>>> {
        let Field { system, ops } = &mut self.field;
        for op in ops.iter_mut() {
            op.refresh(system)?;
        }

        let mut field = Array2::zeros(system.shape());
        for &composition in &[Composition::Additive, Composition::Multiplicative] {
            for op in ops.iter().filter(|op| op.composition() == composition) {
                field = op.apply(system, field)?;
            }
        }
        Ok(field)
    }

    /// Ideal real field on the SLM, normalized to [-1, 1].
    ///
    /// * `bounded` - zero the field outside the physical SLM
    pub fn ideal_field(&mut self, bounded: bool) -> Result<Array2<f64>> {
        let spectrum = self.compose()?;
        let mut ideal = ifft2c(spectrum).mapv(|e| e.re);

        let peak = ideal.iter().fold(0.0f64, |peak, v| peak.max(v.abs()));
        if peak == 0.0 {
            return Err(Error::ZeroField);
        }
        ideal.mapv_inplace(|v| v / peak);

        if bounded {
            self.field.system.bound(&mut ideal)?;
        }
        Ok(ideal)
    }

    /// Binary SLM pattern, `true` where the pixel is on.
    pub fn slm_pattern(&mut self, options: &PatternOptions) -> Result<Array2<bool>> {
        if !options.binary {
            return Err(Error::NotImplemented("gray-scale pattern generation"));
        }
        let ideal = self.ideal_field(options.bounded)?;
        let pattern = binarize(&ideal, options.cf);

        if options.crop {
            Ok(self.field.system.crop(pattern.view())?.to_owned())
        } else {
            Ok(pattern)
        }
    }

    /// Calibrates the pupil mask against the current field.
    pub(crate) fn calibrate_mask(&mut self) -> Result<&AnnularMask> {
        let mask = self.mask.as_mut().ok_or(Error::MissingMask)?;
        mask.calibrate(&self.field.system)?;
        Ok(mask)
    }

    /// Forward model of the pattern through the pupil mask.
    ///
    /// Every image except [`Stage::Pattern`] is Re(E²) of its field, see
    /// [`field_to_intensity`](crate::utils::field_to_intensity).
    pub fn simulate(&mut self, options: &SimulationOptions) -> Result<SimulationResults> {
        let mut results = SimulationResults::new();

        // simulation needs the full grid
        let pattern = self.slm_pattern(&PatternOptions {
            crop: false,
            ..options.pattern
        })?;
        results.insert(
            Stage::Pattern,
            pattern.mapv(|on| if on { 1.0 } else { 0.0 }),
        );

        let pre_mask = fft2c(binary_phase(&pattern));
        results.insert(Stage::PreMask, field_to_intensity(&pre_mask));

        let post_mask = self.calibrate_mask()?.apply(pre_mask)?;
        results.insert(Stage::PostMask, field_to_intensity(&post_mask));

        let excitation = fft2c(post_mask.clone());
        results.insert(Stage::ExcitationXz, field_to_intensity(&excitation));

        if options.views.contains(&Stage::ExcitationXy) {
            let (start, stop) = options.z_range;
            let offsets = arange(start, stop, options.z_step)?;
            let kz = self.field.system.kz();
            results.insert(Stage::ExcitationXy, axial_scan(&post_mask, &kz, &offsets)?);
        }

        if options.crop {
            let system = &self.field.system;
            let (rows, _) = system.roi();
            for (stage, image) in results.iter_mut() {
                let cropped = match stage {
                    // columns are axial offsets, only the lateral axis is cropped
                    Stage::ExcitationXy => image.slice(s![rows.clone(), ..]).to_owned(),
                    _ => system.crop(image.view())?.to_owned(),
                };
                *image = cropped;
            }
        }

        Ok(results)
    }
}

/// Zeroes amplitudes at or below `cf`, then switches on every non-negative pixel.
pub(crate) fn binarize(ideal: &Array2<f64>, cf: f64) -> Array2<bool> {
    ideal.mapv(|v| {
        let v = if v.abs() <= cf { 0.0 } else { v };
        v >= 0.0
    })
}

/// exp(iπ · pattern), the field leaving a binary phase SLM.
pub(crate) fn binary_phase(pattern: &Array2<bool>) -> Array2<Complex<f64>> {
    pattern.mapv(|on| Complex::new(0.0, if on { PI } else { 0.0 }).exp())
}

/// On-axis lateral profile for every axial offset, as the columns of a `N × offsets` image.
///
/// Offsets are independent and computed in parallel over the shared, read-only pupil field and
/// kz grid. The first failing offset aborts the scan.
fn axial_scan(post_mask: &Array2<Complex<f64>>, kz: &Array2<f64>, offsets: &[f64]) -> Result<Array2<f64>> {
    log::info!("scanning {} axial offsets", offsets.len());
    let mut slices = offsets
        .par_iter()
        .map(|&offset| axial_slice(post_mask, kz, offset).map(|slice| (offset, slice)))
        .collect::<Result<Vec<_>>>()?;
    slices.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut xy = Array2::zeros([post_mask.nrows(), slices.len()]);
    for (mut column, (_, slice)) in xy.axis_iter_mut(Axis(1)).zip(slices) {
        column.assign(&slice);
    }
    Ok(xy)
}

fn axial_slice(post_mask: &Array2<Complex<f64>>, kz: &Array2<f64>, offset: f64) -> Result<Array1<f64>> {
    let mut field = post_mask.clone();
    Zip::from(&mut field)
        .and(kz)
        .for_each(|e, &kz| *e *= Complex::new(0.0, kz * offset).exp());
    let field = fft2c(field);

    let profile = field.column(field.ncols() / 2).mapv(|e| (e * e).re);
    if profile.iter().any(|v| !v.is_finite()) {
        return Err(Error::NonFinite { offset });
    }
    Ok(profile)
}

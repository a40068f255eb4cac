//! Annular pupil filter shared by the bandpass operation and the simulated 4f mask.

use crate::error::{Error, Result};
use crate::field::{Geometry, System};
use crate::geometry::pupil_na;
use ndarray::{Array2, Zip};
use num_complex::Complex;

/// Ring of k-space between two device-plane diameters.
#[derive(Clone, Debug)]
pub(crate) struct Annulus {
    pub na_out: f64,
    pub na_in: f64,
    pub ring: Array2<bool>,
}

/// Converts the outer and inner diameters into numerical apertures, then into k-space radii,
/// and selects `inner_k < |k| < outer_k` on the polar k grid of `system`.
pub(crate) fn annulus(system: &System, d_out: f64, d_in: f64, label: &str) -> Result<Annulus> {
    if d_in > d_out {
        return Err(Error::InvalidParameter {
            name: "d_in",
            reason: format!("inner diameter {} exceeds outer diameter {}", d_in, d_out),
        });
    }
    let mag = system.magnification();
    let f_slm = system.slm().f_slm();
    let na_out = pupil_na(d_out, mag, f_slm)?;
    let na_in = pupil_na(d_in, mag, f_slm)?;
    log::info!("[{}] NA:{:.4}, na:{:.4}", label, na_out, na_in);
    if na_out > system.objective().na() {
        log::warn!(
            "[{}] NA {:.4} exceeds the objective NA {:.4}",
            label,
            na_out,
            system.objective().na()
        );
    }

    let k_out = na_out * system.k0();
    let k_in = na_in * system.k0();

    let polar_k = system.polar_k();
    let mut ring = Array2::from_elem(polar_k.raw_dim(), false);
    Zip::from(&mut ring)
        .and(&polar_k)
        .par_for_each(|e, &k| *e = k > k_in && k < k_out);

    Ok(Annulus {
        na_out,
        na_in,
        ring,
    })
}

#[derive(Clone, Debug)]
struct Calibration {
    geometry: Geometry,
    na_out: f64,
    na_in: f64,
    mask: Array2<bool>,
}

/// Annular pupil-plane spatial filter.
///
/// The same filter serves as the bandpass shaping operation and as the pupil mask of the
/// simulated 4f system. It must be calibrated against a field before use.
#[derive(Clone, Debug)]
pub struct AnnularMask {
    d_out: f64,
    d_in: f64,
    calibration: Option<Calibration>,
}

impl AnnularMask {
    /// * `d_out`, `d_in` - outer and inner annulus diameters on the SLM imaging lens, in mm
    pub fn new(d_out: f64, d_in: f64) -> Self {
        AnnularMask {
            d_out,
            d_in,
            calibration: None,
        }
    }

    pub fn d_out(&self) -> f64 {
        self.d_out
    }

    pub fn d_in(&self) -> f64 {
        self.d_in
    }

    pub fn na_out(&self) -> Option<f64> {
        self.calibration.as_ref().map(|c| c.na_out)
    }

    pub fn na_in(&self) -> Option<f64> {
        self.calibration.as_ref().map(|c| c.na_in)
    }

    pub fn calibrate(&mut self, system: &System) -> Result<()> {
        let Annulus {
            na_out,
            na_in,
            ring,
        } = annulus(system, self.d_out, self.d_in, "mask")?;
        self.calibration = Some(Calibration {
            geometry: system.geometry(),
            na_out,
            na_in,
            mask: ring,
        });
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibration.is_some()
    }

    /// Whether the calibration was made against the current geometry of `system`.
    pub fn is_current(&self, system: &System) -> bool {
        self.calibration
            .as_ref()
            .map_or(false, |c| c.geometry == system.geometry())
    }

    /// Transmission of the filter.
    pub fn mask(&self) -> Result<&Array2<bool>> {
        self.calibration
            .as_ref()
            .map(|c| &c.mask)
            .ok_or(Error::Uncalibrated)
    }

    /// Multiplies `field` by the transmission.
    pub fn apply(&self, mut field: Array2<Complex<f64>>) -> Result<Array2<Complex<f64>>> {
        let mask = self.mask()?;
        if field.shape() != mask.shape() {
            return Err(Error::ShapeMismatch {
                expected: [mask.nrows(), mask.ncols()],
                found: [field.nrows(), field.ncols()],
            });
        }
        Zip::from(&mut field).and(mask).par_for_each(|e, &pass| {
            if !pass {
                *e = Complex::new(0.0, 0.0);
            }
        });
        Ok(field)
    }
}

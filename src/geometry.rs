//! Physical description of the SLM and the objective lens.

use crate::error::{positive, Error, Result};

/// Spatial light modulator.
///
/// * `shape` - pixel count as `[ny, nx]`
/// * `pitch` - physical pixel pitch `(dy, dx)` in microns
/// * `f_slm` - focal length of the SLM imaging lens in mm
#[derive(Clone, Debug, PartialEq)]
pub struct Slm {
    shape: [usize; 2],
    pitch: (f64, f64),
    f_slm: f64,
}

impl Slm {
    pub fn new(shape: [usize; 2], pitch: (f64, f64), f_slm: f64) -> Result<Self> {
        if shape[0] == 0 || shape[1] == 0 {
            return Err(Error::InvalidParameter {
                name: "shape",
                reason: format!("SLM must have at least one pixel, got {:?}", shape),
            });
        }
        positive("pitch", pitch.0)?;
        positive("pitch", pitch.1)?;
        positive("f_slm", f_slm)?;
        Ok(Slm {
            shape,
            pitch,
            f_slm,
        })
    }

    pub fn shape(&self) -> [usize; 2] {
        self.shape
    }

    pub fn pitch(&self) -> (f64, f64) {
        self.pitch
    }

    /// Focal length of the SLM imaging lens.
    pub fn f_slm(&self) -> f64 {
        self.f_slm
    }
}

/// Microscope objective.
#[derive(Clone, Debug, PartialEq)]
pub struct Objective {
    mag: f64,
    na: f64,
    f_tube: f64,
    ri: f64,
}

impl Objective {
    /// Objective in air.
    pub fn new(mag: f64, na: f64, f_tube: f64) -> Result<Self> {
        Self::immersed(mag, na, f_tube, 1.0)
    }

    /// * `ri` - refractive index of the immersion medium
    pub fn immersed(mag: f64, na: f64, f_tube: f64, ri: f64) -> Result<Self> {
        positive("mag", mag)?;
        positive("f_tube", f_tube)?;
        positive("ri", ri)?;
        if !(na > 0.0 && na <= ri) {
            return Err(Error::NumericalAperture { na });
        }
        Ok(Objective { mag, na, f_tube, ri })
    }

    pub fn mag(&self) -> f64 {
        self.mag
    }

    pub fn na(&self) -> f64 {
        self.na
    }

    /// Compatible tube lens focal length.
    pub fn f_tube(&self) -> f64 {
        self.f_tube
    }

    /// Refractive index.
    pub fn ri(&self) -> f64 {
        self.ri
    }

    /// Objective focal length.
    pub fn focal_length(&self) -> f64 {
        self.f_tube / self.mag
    }

    /// Back aperture diameter, in the unit of the tube focal length.
    pub fn pupil_diameter(&self) -> f64 {
        let na = self.na / self.ri;
        2.0 * self.focal_length() * na / (1.0 - na * na).sqrt()
    }
}

/// Numerical aperture subtended by a device-plane diameter after the system
/// magnification.
///
/// * `d` - diameter on the SLM imaging lens side, in mm
/// * `mag` - overall system magnification
/// * `f_slm` - SLM imaging lens focal length, in mm
pub fn pupil_na(d: f64, mag: f64, f_slm: f64) -> Result<f64> {
    let na = d * mag / (2.0 * f_slm);
    if na.is_finite() && na >= 0.0 {
        Ok(na)
    } else {
        Err(Error::NumericalAperture { na })
    }
}

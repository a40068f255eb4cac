//! TOML description of a pattern job.
//!
//! ```toml
//! wavelength = 0.488
//! magnification = 60.0
//!
//! [slm]
//! shape = [1536, 2048]
//! pixel_size = [8.2, 8.2]
//! focal_length = 500.0
//!
//! [objective]
//! magnification = 10.0
//! numerical_aperture = 0.3
//! tube_focal_length = 200.0
//!
//! [[operation]]
//! type = "lattice"
//! d_out = 3.824
//! d_in = 2.689
//! n_beam = 7
//! spacing = 3.0
//!
//! [[operation]]
//! type = "defocus"
//! foci = [80.0]
//!
//! [mask]
//! d_out = 3.824
//! d_in = 2.689
//!
//! [simulation]
//! views = ["excitation_xy"]
//! z_range = [0.0, 200.0]
//! z_step = 5.0
//! cropping_factor = 0.05
//! ```

use crate::error::{Error, Result};
use crate::field::Field;
use crate::geometry::{Objective, Slm};
use crate::mask::AnnularMask;
use crate::ops::{Bessel, Defocus, Lattice, Operation};
use crate::synthesizer::{PatternOptions, SimulationOptions, Stage, Synthesizer};
use serde::Deserialize;
use std::path::Path;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    /// Wavelength in microns.
    pub wavelength: f64,
    /// Overall magnification from the SLM to the sample.
    pub magnification: f64,
    /// Working grid size, defaults to the larger SLM dimension.
    #[serde(default)]
    pub grid_size: Option<usize>,
    /// Pad the working grid to an FFT friendly size.
    #[serde(default)]
    pub fast_padding: bool,
    pub slm: SlmConfig,
    pub objective: ObjectiveConfig,
    #[serde(default, rename = "operation")]
    pub operations: Vec<OperationConfig>,
    #[serde(default)]
    pub mask: Option<MaskConfig>,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Deserialize)]
pub struct SlmConfig {
    pub shape: [usize; 2],
    /// Pixel pitch `[dy, dx]` in microns.
    pub pixel_size: [f64; 2],
    /// Imaging lens focal length in mm.
    pub focal_length: f64,
}

#[derive(Debug, Deserialize)]
pub struct ObjectiveConfig {
    pub magnification: f64,
    pub numerical_aperture: f64,
    pub tube_focal_length: f64,
    #[serde(default = "default_refractive_index")]
    pub refractive_index: f64,
}

fn default_refractive_index() -> f64 {
    1.0
}

/// A shaping operation, tagged by `type`.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationConfig {
    Bandpass {
        d_out: f64,
        d_in: f64,
    },
    Bessel {
        d_out: f64,
        d_in: f64,
    },
    Lattice {
        d_out: f64,
        d_in: f64,
        n_beam: usize,
        spacing: f64,
        #[serde(default)]
        tilt: f64,
    },
    Defocus {
        foci: Vec<f64>,
        /// Uniform when omitted.
        #[serde(default)]
        weights: Option<Vec<f64>>,
    },
}

impl OperationConfig {
    pub fn build(&self) -> Result<Operation> {
        Ok(match *self {
            OperationConfig::Bandpass { d_out, d_in } => AnnularMask::new(d_out, d_in).into(),
            OperationConfig::Bessel { d_out, d_in } => Bessel::new(d_out, d_in).into(),
            OperationConfig::Lattice {
                d_out,
                d_in,
                n_beam,
                spacing,
                tilt,
            } => Lattice::new(d_out, d_in, n_beam, spacing, tilt)?.into(),
            OperationConfig::Defocus {
                ref foci,
                ref weights,
            } => match weights {
                None => Defocus::stack(foci)?.into(),
                Some(weights) if weights.len() == foci.len() => {
                    Defocus::weighted(foci.iter().copied().zip(weights.iter().copied()).collect())?
                        .into()
                }
                Some(weights) => {
                    return Err(Error::InvalidParameter {
                        name: "weights",
                        reason: format!("{} weights for {} foci", weights.len(), foci.len()),
                    })
                }
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct MaskConfig {
    pub d_out: f64,
    pub d_in: f64,
}

#[derive(Debug, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub views: Vec<Stage>,
    #[serde(default)]
    pub crop: bool,
    #[serde(default = "default_z_range")]
    pub z_range: [f64; 2],
    #[serde(default = "default_z_step")]
    pub z_step: f64,
    #[serde(default = "default_cropping_factor")]
    pub cropping_factor: f64,
    #[serde(default)]
    pub bounded: bool,
}

fn default_z_range() -> [f64; 2] {
    [-100.0, 100.0]
}

fn default_z_step() -> f64 {
    10.0
}

fn default_cropping_factor() -> f64 {
    0.15
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            views: Vec::new(),
            crop: false,
            z_range: default_z_range(),
            z_step: default_z_step(),
            cropping_factor: default_cropping_factor(),
            bounded: false,
        }
    }
}

impl JobConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn field(&self) -> Result<Field> {
        let slm = Slm::new(
            self.slm.shape,
            (self.slm.pixel_size[0], self.slm.pixel_size[1]),
            self.slm.focal_length,
        )?;
        let o = &self.objective;
        let objective = Objective::immersed(
            o.magnification,
            o.numerical_aperture,
            o.tube_focal_length,
            o.refractive_index,
        )?;
        let mut field = Field::new(slm, objective, self.wavelength, self.magnification)?;
        if let Some(n) = self.grid_size {
            field = field.with_grid_size(n)?;
        }
        if self.fast_padding {
            field = field.with_fast_padding();
        }
        for op in &self.operations {
            field.register(op.build()?);
        }
        Ok(field)
    }

    pub fn synthesizer(&self) -> Result<Synthesizer> {
        let mask = self
            .mask
            .as_ref()
            .map(|m| AnnularMask::new(m.d_out, m.d_in));
        Ok(Synthesizer::new(self.field()?, mask))
    }

    pub fn pattern_options(&self) -> PatternOptions {
        PatternOptions {
            cf: self.simulation.cropping_factor,
            bounded: self.simulation.bounded,
            ..Default::default()
        }
    }

    pub fn simulation_options(&self) -> SimulationOptions {
        let sim = &self.simulation;
        SimulationOptions {
            views: sim.views.clone(),
            crop: sim.crop,
            z_range: (sim.z_range[0], sim.z_range[1]),
            z_step: sim.z_step,
            pattern: self.pattern_options(),
        }
    }
}

//! Binary SLM patterns for Bessel and lattice light-sheet illumination.
//!
//! A [`Field`] holds the optical [`System`] (SLM, objective, wavelength and magnification) and an
//! ordered list of k-space shaping [`Operation`]s. The [`Synthesizer`] composes those operations
//! into an ideal real field on the SLM, binarizes it into a phase pattern, and can propagate that
//! pattern through an annular pupil mask to preview the excitation in the sample.
//!
//! ```no_run
//! use slm_pattern::{AnnularMask, Bessel, Field, Objective, PatternOptions, Slm, Synthesizer};
//!
//! # fn main() -> slm_pattern::Result<()> {
//! let slm = Slm::new([1536, 2048], (8.2, 8.2), 500.0)?;
//! let objective = Objective::new(10.0, 0.3, 200.0)?;
//! let mut field = Field::new(slm, objective, 0.488, 60.0)?;
//! field.register(Bessel::new(3.824, 2.689));
//!
//! let mut synth = Synthesizer::new(field, Some(AnnularMask::new(3.824, 2.689)));
//! let pattern = synth.slm_pattern(&PatternOptions::default())?;
//! # Ok(())
//! # }
//! ```

pub mod config;
mod error;
pub mod estimate;
mod fft2;
pub mod field;
mod find_fast_number;
pub mod geometry;
pub mod mask;
pub mod ops;
pub mod synthesizer;
pub mod utils;

pub use crate::config::JobConfig;
pub use crate::error::{Error, Result};
pub use crate::estimate::{best_cropping_factor, sweep_cropping_factor, CfScore};
pub use crate::fft2::{crop_center, fft2c, ifft2c};
pub use crate::field::{Field, Geometry, System};
pub use crate::find_fast_number::fastish_fft_len;
pub use crate::geometry::{pupil_na, Objective, Slm};
pub use crate::mask::AnnularMask;
pub use crate::ops::{Bessel, Composition, Defocus, Lattice, Operation};
pub use crate::synthesizer::{
    PatternOptions, SimulationOptions, SimulationResults, Stage, Synthesizer,
};
pub use crate::utils::{arange, display_range, field_to_intensity, pack_bits, percentile};

use thiserror::Error;

/// Errors raised while building or evaluating an optical system.
#[derive(Error, Debug)]
pub enum Error {
    #[error("mask has not been calibrated against a field")]
    Uncalibrated,
    #[error("shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: [usize; 2],
        found: [usize; 2],
    },
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("ideal field is identically zero and cannot be normalized")]
    ZeroField,
    #[error("numerical aperture {na} is not physical")]
    NumericalAperture { na: f64 },
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("{0} template was built for a different geometry, refresh it first")]
    StaleTemplate(&'static str),
    #[error("simulation requires a pupil mask")]
    MissingMask,
    #[error("invalid axial scan: range [{start}, {stop}) with step {step}")]
    InvalidScan { start: f64, stop: f64, step: f64 },
    #[error("non-finite intensity at axial offset {offset}")]
    NonFinite { offset: f64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejects values that are not strictly positive and finite.
pub(crate) fn positive(name: &'static str, value: f64) -> Result<f64> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(Error::InvalidParameter {
            name,
            reason: format!("expected a positive finite value, got {}", value),
        })
    }
}

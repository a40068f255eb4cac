//! Coordinate system of the optical train and the ordered list of shaping operations.

use crate::error::{positive, Error, Result};
use crate::fft2::crop_center;
use crate::find_fast_number::fastish_fft_len;
use crate::geometry::{Objective, Slm};
use crate::ops::Operation;
use ndarray::{s, Array1, Array2, ArrayView2, Zip};
use std::f64::consts::PI;
use std::ops::Range;

/// The quantities every cached template depends on.
///
/// Templates are tagged with the geometry they were built from, a template is only valid while
/// the tag compares equal to the geometry of the system it is applied against.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Geometry {
    pub grid: usize,
    pub pitch: (f64, f64),
    pub f_slm: f64,
    pub magnification: f64,
    pub wavelength: f64,
}

/// SLM, objective, wavelength and magnification, plus the square working grid they are sampled on.
#[derive(Clone, Debug)]
pub struct System {
    slm: Slm,
    objective: Objective,
    wavelength: f64,
    magnification: f64,
    padding: Padding,
    grid: usize,
}

/// Requested enlargement of the working grid, re-applied whenever the SLM changes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Padding {
    size: Option<usize>,
    fast: bool,
}

impl System {
    /// * `wavelength` - in microns
    /// * `magnification` - overall magnification from the SLM to the sample
    pub fn new(slm: Slm, objective: Objective, wavelength: f64, magnification: f64) -> Result<Self> {
        positive("wavelength", wavelength)?;
        positive("magnification", magnification)?;
        let mut system = System {
            slm,
            objective,
            wavelength,
            magnification,
            padding: Padding::default(),
            grid: 0,
        };
        system.resize();
        Ok(system)
    }

    /// N = max(SLM shape), enlarged by the padding request.
    fn resize(&mut self) {
        let [ny, nx] = self.slm.shape();
        let grid = ny.max(nx).max(self.padding.size.unwrap_or(0));
        self.grid = if self.padding.fast {
            fastish_fft_len(grid)
        } else {
            grid
        };
    }

    pub fn slm(&self) -> &Slm {
        &self.slm
    }

    pub fn objective(&self) -> &Objective {
        &self.objective
    }

    pub fn wavelength(&self) -> f64 {
        self.wavelength
    }

    pub fn magnification(&self) -> f64 {
        self.magnification
    }

    /// Side length N of the square working grid.
    pub fn grid_size(&self) -> usize {
        self.grid
    }

    pub fn shape(&self) -> [usize; 2] {
        [self.grid, self.grid]
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            grid: self.grid,
            pitch: self.slm.pitch(),
            f_slm: self.slm.f_slm(),
            magnification: self.magnification,
            wavelength: self.wavelength,
        }
    }

    /// Pixel pitch projected into the sample plane.
    pub fn effective_pitch(&self) -> (f64, f64) {
        let (dy, dx) = self.slm.pitch();
        (dy / self.magnification, dx / self.magnification)
    }

    /// Wavenumber in the medium, 2π/λ.
    pub fn k0(&self) -> f64 {
        2.0 * PI / self.wavelength
    }

    /// Symmetric grid vector from -(N-1)/2 to (N-1)/2, scaled by `step`.
    fn axis(&self, step: f64) -> Array1<f64> {
        let n = self.grid;
        let half = (n as f64 - 1.0) / 2.0;
        Array1::from_shape_fn(n, |i| (i as f64 - half) * step)
    }

    fn meshgrid(&self, (dy, dx): (f64, f64)) -> (Array2<f64>, Array2<f64>) {
        let vy = self.axis(dy);
        let vx = self.axis(dx);
        let n = self.grid;
        let gy = Array2::from_shape_fn([n, n], |(i, _)| vy[i]);
        let gx = Array2::from_shape_fn([n, n], |(_, j)| vx[j]);
        (gy, gx)
    }

    /// Real space coordinates `(y, x)` in microns, "ij" indexed.
    pub fn cartesian_r(&self) -> (Array2<f64>, Array2<f64>) {
        self.meshgrid(self.effective_pitch())
    }

    pub fn polar_r(&self) -> Array2<f64> {
        let (gy, gx) = self.cartesian_r();
        hypot(&gy, &gx)
    }

    /// Reciprocal space coordinates `(ky, kx)` in rad/micron, "ij" indexed.
    pub fn cartesian_k(&self) -> (Array2<f64>, Array2<f64>) {
        let (dy, dx) = self.effective_pitch();
        let n = self.grid as f64;
        self.meshgrid((2.0 * PI / n / dy, 2.0 * PI / n / dx))
    }

    pub fn polar_k(&self) -> Array2<f64> {
        let (gky, gkx) = self.cartesian_k();
        hypot(&gky, &gkx)
    }

    /// Axial wavevector component, sqrt((2π/λ)² - k_r²).
    ///
    /// Frequencies beyond the bandwidth of the system are evanescent and clamped to 0.
    pub fn kz(&self) -> Array2<f64> {
        self.kz_clamped().0
    }

    /// As [`System::kz`], also returning the number of clamped elements.
    pub fn kz_clamped(&self) -> (Array2<f64>, usize) {
        let k0 = self.k0();
        let mut kz = self.polar_k();
        let mut clamped = 0;
        kz.iter_mut().for_each(|k| {
            let radicand = k0 * k0 - *k * *k;
            if radicand < 0.0 {
                clamped += 1;
                *k = 0.0;
            } else {
                *k = radicand.sqrt();
            }
        });
        if clamped > 0 {
            log::warn!(
                "{} spatial frequencies exceed the system bandwidth, kz clamped to 0",
                clamped
            );
        }
        (kz, clamped)
    }

    /// Rows and columns of the working grid covered by the SLM.
    pub fn roi(&self) -> (Range<usize>, Range<usize>) {
        let [ny, nx] = self.slm.shape();
        let oy = (self.grid - ny) / 2;
        let ox = (self.grid - nx) / 2;
        (oy..oy + ny, ox..ox + nx)
    }

    /// View of `array` restricted to the SLM region.
    pub fn crop<'a, T>(&self, array: ArrayView2<'a, T>) -> Result<ArrayView2<'a, T>> {
        self.check_shape(array.shape())?;
        Ok(crop_center(array, self.slm.shape()))
    }

    /// Zeroes everything outside of the SLM region.
    pub fn bound(&self, array: &mut Array2<f64>) -> Result<()> {
        self.check_shape(array.shape())?;
        let (rows, cols) = self.roi();
        let mut bounded = Array2::zeros(array.raw_dim());
        bounded
            .slice_mut(s![rows.clone(), cols.clone()])
            .assign(&array.slice(s![rows, cols]));
        *array = bounded;
        Ok(())
    }

    pub(crate) fn check_shape(&self, shape: &[usize]) -> Result<()> {
        if shape == &self.shape()[..] {
            Ok(())
        } else {
            Err(Error::ShapeMismatch {
                expected: self.shape(),
                found: [shape[0], *shape.get(1).unwrap_or(&0)],
            })
        }
    }
}

fn hypot(a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
    let mut out = Array2::zeros(a.raw_dim());
    Zip::from(&mut out)
        .and(a)
        .and(b)
        .par_for_each(|o, &a, &b| *o = a.hypot(b));
    out
}

/// The optical system together with the shaping operations registered on it.
///
/// Operations are evaluated in k-space by the [`Synthesizer`](crate::Synthesizer). Changing any
/// system parameter invalidates every cached operation template.
#[derive(Clone, Debug)]
pub struct Field {
    pub(crate) system: System,
    pub(crate) ops: Vec<Operation>,
}

impl Field {
    pub fn new(slm: Slm, objective: Objective, wavelength: f64, magnification: f64) -> Result<Self> {
        Ok(Field {
            system: System::new(slm, objective, wavelength, magnification)?,
            ops: Vec::new(),
        })
    }

    /// Oversize the working grid to `n`, zero padding around the SLM.
    pub fn with_grid_size(mut self, n: usize) -> Result<Self> {
        let [ny, nx] = self.system.slm.shape();
        if n < ny.max(nx) {
            return Err(Error::InvalidParameter {
                name: "grid_size",
                reason: format!("{} is smaller than the SLM {:?}", n, [ny, nx]),
            });
        }
        self.system.padding = Padding {
            size: Some(n),
            fast: false,
        };
        self.system.resize();
        Ok(self)
    }

    /// Pad the working grid to the next length with only small prime factors.
    pub fn with_fast_padding(mut self) -> Self {
        self.system.padding.fast = true;
        self.system.resize();
        self
    }

    pub fn system(&self) -> &System {
        &self.system
    }

    pub fn geometry(&self) -> Geometry {
        self.system.geometry()
    }

    pub fn shape(&self) -> [usize; 2] {
        self.system.shape()
    }

    pub fn slm(&self) -> &Slm {
        self.system.slm()
    }

    pub fn objective(&self) -> &Objective {
        self.system.objective()
    }

    pub fn wavelength(&self) -> f64 {
        self.system.wavelength
    }

    pub fn magnification(&self) -> f64 {
        self.system.magnification
    }

    pub fn set_wavelength(&mut self, wavelength: f64) -> Result<()> {
        self.system.wavelength = positive("wavelength", wavelength)?;
        Ok(())
    }

    pub fn set_magnification(&mut self, magnification: f64) -> Result<()> {
        self.system.magnification = positive("magnification", magnification)?;
        Ok(())
    }

    /// Replace the SLM. The working grid is recomputed from the new device and any padding
    /// requested with [`Field::with_grid_size`] or [`Field::with_fast_padding`].
    pub fn set_slm(&mut self, slm: Slm) {
        self.system.slm = slm;
        self.system.resize();
    }

    pub fn set_objective(&mut self, objective: Objective) {
        self.system.objective = objective;
    }

    /// Append an operation, evaluation follows registration order within its composition class.
    pub fn register<O: Into<Operation>>(&mut self, op: O) {
        self.ops.push(op.into());
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn operations(&self) -> &[Operation] {
        &self.ops
    }

    pub fn cartesian_r(&self) -> (Array2<f64>, Array2<f64>) {
        self.system.cartesian_r()
    }

    pub fn polar_r(&self) -> Array2<f64> {
        self.system.polar_r()
    }

    pub fn cartesian_k(&self) -> (Array2<f64>, Array2<f64>) {
        self.system.cartesian_k()
    }

    pub fn polar_k(&self) -> Array2<f64> {
        self.system.polar_k()
    }

    pub fn kz(&self) -> Array2<f64> {
        self.system.kz()
    }
}

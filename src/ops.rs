//! Field shaping operations.
//!
//! Every operation is evaluated in k-space against the grids of a [`System`] and keeps a template
//! tagged with the [`Geometry`] it was computed from. A template never silently outlives a change
//! of wavelength, magnification or pixel geometry: [`Operation::apply`] refuses a stale template
//! and [`Operation::refresh`] rebuilds it.

use crate::error::{Error, Result};
use crate::field::{Geometry, System};
use crate::mask::{annulus, AnnularMask};
use ndarray::{Array1, Array2, Zip};
use num_complex::Complex;

/// How an operation combines with the field accumulated so far.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Composition {
    /// Contributes a beam, independently of the other contributions.
    Additive,
    /// Filters or phases the sum of all additive contributions.
    Multiplicative,
}

#[derive(Clone, Debug)]
struct Template<T> {
    geometry: Geometry,
    values: Array2<T>,
}

impl<T> Template<T> {
    fn current<'a>(
        template: &'a Option<Template<T>>,
        system: &System,
        name: &'static str,
    ) -> Result<&'a Array2<T>> {
        match template {
            Some(t) if t.geometry == system.geometry() => Ok(&t.values),
            _ => Err(Error::StaleTemplate(name)),
        }
    }
}

/// Bessel beam, an annular ring in the pupil.
#[derive(Clone, Debug)]
pub struct Bessel {
    d_out: f64,
    d_in: f64,
    template: Option<Template<bool>>,
}

impl Bessel {
    /// * `d_out`, `d_in` - outer and inner ring diameters on the SLM imaging lens, in mm
    pub fn new(d_out: f64, d_in: f64) -> Self {
        Bessel {
            d_out,
            d_in,
            template: None,
        }
    }

    pub fn d_out(&self) -> f64 {
        self.d_out
    }

    pub fn d_in(&self) -> f64 {
        self.d_in
    }

    pub fn update(&mut self, system: &System) -> Result<()> {
        let ring = annulus(system, self.d_out, self.d_in, "bessel")?.ring;
        self.template = Some(Template {
            geometry: system.geometry(),
            values: ring,
        });
        Ok(())
    }

    pub fn template(&self, system: &System) -> Result<&Array2<bool>> {
        Template::current(&self.template, system, "bessel")
    }

    pub fn apply(
        &self,
        system: &System,
        mut field: Array2<Complex<f64>>,
    ) -> Result<Array2<Complex<f64>>> {
        system.check_shape(field.shape())?;
        let ring = self.template(system)?;
        Zip::from(&mut field).and(ring).par_for_each(|e, &r| {
            if r {
                *e += 1.0;
            }
        });
        Ok(field)
    }
}

/// Lattice of `n_beam` coherent Bessel beams, equally spaced along an axis tilted by `tilt`.
#[derive(Clone, Debug)]
pub struct Lattice {
    bessel: Bessel,
    n_beam: usize,
    spacing: f64,
    tilt: f64,
    template: Option<Template<Complex<f64>>>,
}

impl Lattice {
    /// * `n_beam` - number of beams, at least one
    /// * `spacing` - distance between neighbouring beams, in microns
    /// * `tilt` - angle of the lattice axis from the x axis, in radians
    pub fn new(d_out: f64, d_in: f64, n_beam: usize, spacing: f64, tilt: f64) -> Result<Self> {
        if n_beam == 0 {
            return Err(Error::InvalidParameter {
                name: "n_beam",
                reason: "a lattice needs at least one beam".to_string(),
            });
        }
        Ok(Lattice {
            bessel: Bessel::new(d_out, d_in),
            n_beam,
            spacing,
            tilt,
            template: None,
        })
    }

    pub fn n_beam(&self) -> usize {
        self.n_beam
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn tilt(&self) -> f64 {
        self.tilt
    }

    /// Beam positions along the lattice axis, centered on the optical axis.
    pub fn offsets(&self) -> Array1<f64> {
        let n = self.n_beam as f64;
        Array1::linspace(-(n - 1.0) / 2.0, (n - 1.0) / 2.0, self.n_beam) * self.spacing
    }

    /// The Bessel ring times the coherent sum of one phase ramp per beam, divided by the beam
    /// count so the total power does not depend on it.
    ///
    /// This costs O(n_beam · N²) and dominates synthesis for large lattices on large grids.
    pub fn update(&mut self, system: &System) -> Result<()> {
        self.bessel.update(system)?;
        let ring = self.bessel.template(system)?;

        let offsets = self.offsets().to_vec();
        for offset in &offsets {
            log::debug!("[lattice] offset:{}", offset);
        }
        let (ky, kx) = system.cartesian_k();
        let mut lattice = coherent_sum(&offsets, &ky, &kx, self.tilt);

        let n = self.n_beam as f64;
        Zip::from(&mut lattice).and(ring).par_for_each(|e, &r| {
            *e = if r { *e / n } else { Complex::new(0.0, 0.0) };
        });

        self.template = Some(Template {
            geometry: system.geometry(),
            values: lattice,
        });
        Ok(())
    }

    pub fn template(&self, system: &System) -> Result<&Array2<Complex<f64>>> {
        Template::current(&self.template, system, "lattice")
    }

    pub fn apply(
        &self,
        system: &System,
        mut field: Array2<Complex<f64>>,
    ) -> Result<Array2<Complex<f64>>> {
        system.check_shape(field.shape())?;
        field += self.template(system)?;
        Ok(field)
    }
}

/// Σ exp(i · offset · (kx cos θ + ky sin θ)) over the offsets, pixel by pixel.
///
/// Each pixel sums the offsets in the given order on a single thread, so the result is
/// deterministic regardless of how pixels are scheduled.
pub(crate) fn coherent_sum(
    offsets: &[f64],
    ky: &Array2<f64>,
    kx: &Array2<f64>,
    tilt: f64,
) -> Array2<Complex<f64>> {
    let (sin, cos) = tilt.sin_cos();
    let mut sum = Array2::zeros(kx.raw_dim());
    Zip::from(&mut sum)
        .and(ky)
        .and(kx)
        .par_for_each(|e: &mut Complex<f64>, &ky, &kx| {
            let axis = kx * cos + ky * sin;
            *e = offsets
                .iter()
                .map(|&offset| Complex::new(0.0, offset * axis).exp())
                .sum();
        });
    sum
}

/// Axial shift of the focal plane, optionally a weighted stack of several focal planes.
#[derive(Clone, Debug)]
pub struct Defocus {
    foci: Vec<(f64, f64)>,
    template: Option<Template<Complex<f64>>>,
}

impl Defocus {
    /// * `focus` - axial offset in microns
    pub fn new(focus: f64) -> Self {
        Defocus {
            foci: vec![(focus, 1.0)],
            template: None,
        }
    }

    /// Several focal planes of equal weight.
    pub fn stack(foci: &[f64]) -> Result<Self> {
        Self::weighted(foci.iter().map(|&f| (f, 1.0)).collect())
    }

    /// `(focus, weight)` pairs.
    pub fn weighted(foci: Vec<(f64, f64)>) -> Result<Self> {
        if foci.is_empty() {
            return Err(Error::InvalidParameter {
                name: "foci",
                reason: "at least one focal plane is required".to_string(),
            });
        }
        Ok(Defocus {
            foci,
            template: None,
        })
    }

    pub fn foci(&self) -> &[(f64, f64)] {
        &self.foci
    }

    /// Σ wᵢ exp(i kz fᵢ)
    pub fn update(&mut self, system: &System) -> Result<()> {
        let kz = system.kz();
        let mut phase = Array2::zeros(kz.raw_dim());
        for &(focus, weight) in &self.foci {
            Zip::from(&mut phase)
                .and(&kz)
                .par_for_each(|e: &mut Complex<f64>, &kz| {
                    *e += Complex::new(0.0, kz * focus).exp() * weight
                });
        }
        self.template = Some(Template {
            geometry: system.geometry(),
            values: phase,
        });
        Ok(())
    }

    pub fn template(&self, system: &System) -> Result<&Array2<Complex<f64>>> {
        Template::current(&self.template, system, "defocus")
    }

    /// Replaces the field by its defocused sum.
    pub fn apply(
        &self,
        system: &System,
        mut field: Array2<Complex<f64>>,
    ) -> Result<Array2<Complex<f64>>> {
        system.check_shape(field.shape())?;
        field *= self.template(system)?;
        Ok(field)
    }
}

/// A field shaping operation registered on a [`Field`](crate::Field).
#[derive(Clone, Debug)]
pub enum Operation {
    Bandpass(AnnularMask),
    Bessel(Bessel),
    Lattice(Lattice),
    Defocus(Defocus),
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Bandpass(_) => "bandpass",
            Operation::Bessel(_) => "bessel",
            Operation::Lattice(_) => "lattice",
            Operation::Defocus(_) => "defocus",
        }
    }

    pub fn composition(&self) -> Composition {
        match self {
            Operation::Bessel(_) | Operation::Lattice(_) => Composition::Additive,
            Operation::Bandpass(_) | Operation::Defocus(_) => Composition::Multiplicative,
        }
    }

    /// Recompute the cached template from the current geometry of `system`.
    pub fn update(&mut self, system: &System) -> Result<()> {
        match self {
            Operation::Bandpass(mask) => mask.calibrate(system),
            Operation::Bessel(op) => op.update(system),
            Operation::Lattice(op) => op.update(system),
            Operation::Defocus(op) => op.update(system),
        }
    }

    pub fn is_current(&self, system: &System) -> bool {
        match self {
            Operation::Bandpass(mask) => mask.is_current(system),
            Operation::Bessel(op) => op.template(system).is_ok(),
            Operation::Lattice(op) => op.template(system).is_ok(),
            Operation::Defocus(op) => op.template(system).is_ok(),
        }
    }

    /// Update only if the template is missing or stale.
    pub fn refresh(&mut self, system: &System) -> Result<()> {
        if self.is_current(system) {
            return Ok(());
        }
        log::debug!("[{}] rebuilding template", self.name());
        self.update(system)
    }

    /// Combine the template with `field`, additively or multiplicatively per [`Composition`].
    pub fn apply(
        &self,
        system: &System,
        field: Array2<Complex<f64>>,
    ) -> Result<Array2<Complex<f64>>> {
        match self {
            Operation::Bandpass(mask) => {
                system.check_shape(field.shape())?;
                if mask.is_calibrated() && !mask.is_current(system) {
                    return Err(Error::StaleTemplate("bandpass"));
                }
                mask.apply(field)
            }
            Operation::Bessel(op) => op.apply(system, field),
            Operation::Lattice(op) => op.apply(system, field),
            Operation::Defocus(op) => op.apply(system, field),
        }
    }
}

impl From<AnnularMask> for Operation {
    fn from(mask: AnnularMask) -> Self {
        Operation::Bandpass(mask)
    }
}

impl From<Bessel> for Operation {
    fn from(op: Bessel) -> Self {
        Operation::Bessel(op)
    }
}

impl From<Lattice> for Operation {
    fn from(op: Lattice) -> Self {
        Operation::Lattice(op)
    }
}

impl From<Defocus> for Operation {
    fn from(op: Defocus) -> Self {
        Operation::Defocus(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::qxga_like;
    use approx::assert_relative_eq;

    fn power(values: &Array2<Complex<f64>>) -> f64 {
        values.iter().map(|v| v.norm_sqr()).sum()
    }

    #[test]
    fn lattice_offsets_are_centered() {
        let lattice = Lattice::new(3.824, 2.689, 4, 2.0, 0.0).unwrap();
        assert_eq!(lattice.offsets().to_vec(), vec![-3.0, -1.0, 1.0, 3.0]);
        assert!(Lattice::new(3.824, 2.689, 0, 2.0, 0.0).is_err());
    }

    #[test]
    fn single_beam_lattice_conserves_energy() {
        let field = qxga_like([64, 64]);
        let system = field.system();

        let mut bessel = Bessel::new(3.824, 2.689);
        bessel.update(system).unwrap();
        let bessel_power = bessel.template(system).unwrap().iter().filter(|&&r| r).count() as f64;

        let mut lattice = Lattice::new(3.824, 2.689, 1, 3.0, 0.3).unwrap();
        lattice.update(system).unwrap();
        let lattice = lattice.template(system).unwrap();

        assert!(bessel_power > 0.0);
        assert_relative_eq!(power(lattice) / 1.0, bessel_power, max_relative = 1e-12);
    }

    #[test]
    fn lattice_is_bounded_by_ring() {
        let field = qxga_like([64, 64]);
        let system = field.system();
        let mut lattice = Lattice::new(3.824, 2.689, 7, 3.0, 0.0).unwrap();
        lattice.update(system).unwrap();
        let mut bessel = Bessel::new(3.824, 2.689);
        bessel.update(system).unwrap();
        let ring = bessel.template(system).unwrap();
        for (v, &r) in lattice.template(system).unwrap().iter().zip(ring.iter()) {
            // |Σ exp(iφ)| / n never exceeds one
            assert!(v.norm() <= 1.0 + 1e-12);
            if !r {
                assert_eq!(v.norm(), 0.0);
            }
        }
    }

    #[test]
    fn coherent_sum_is_order_independent() {
        let field = qxga_like([32, 32]);
        let (ky, kx) = field.cartesian_k();
        let offsets = [-4.5, -1.5, 1.5, 4.5, 7.5];
        let mut permuted = offsets;
        permuted.reverse();
        permuted.swap(0, 2);

        let a = coherent_sum(&offsets, &ky, &kx, 0.4);
        let b = coherent_sum(&permuted, &ky, &kx, 0.4);
        for (a, b) in a.iter().zip(b.iter()) {
            assert!((a - b).norm() < 1e-12);
        }
    }

    #[test]
    fn weighted_defocus_matches_single_focus() {
        let field = qxga_like([32, 32]);
        let system = field.system();
        let mut single = Defocus::new(5.0);
        single.update(system).unwrap();
        let mut weighted = Defocus::weighted(vec![(5.0, 1.0)]).unwrap();
        weighted.update(system).unwrap();
        assert_eq!(
            single.template(system).unwrap(),
            weighted.template(system).unwrap()
        );

        let mut stack = Defocus::stack(&[-5.0, 5.0]).unwrap();
        stack.update(system).unwrap();
        // exp(ia) + exp(-ia) is real
        for v in stack.template(system).unwrap().iter() {
            assert!(v.im.abs() < 1e-12);
        }
        assert!(Defocus::stack(&[]).is_err());
    }

    #[test]
    fn zero_defocus_is_identity() {
        let field = qxga_like([16, 16]);
        let system = field.system();
        let mut op = Operation::from(Defocus::new(0.0));
        op.refresh(system).unwrap();
        let input = Array2::from_shape_fn([16, 16], |(i, j)| Complex::new(i as f64, j as f64));
        let output = op.apply(system, input.clone()).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn stale_templates_are_refused_then_rebuilt() {
        let mut field = qxga_like([32, 32]);
        let mut op = Operation::from(Bessel::new(3.824, 2.689));
        assert!(matches!(
            op.apply(field.system(), Array2::zeros([32, 32])),
            Err(Error::StaleTemplate("bessel"))
        ));
        op.refresh(field.system()).unwrap();
        assert!(op.is_current(field.system()));

        field.set_wavelength(0.561).unwrap();
        assert!(!op.is_current(field.system()));
        assert!(matches!(
            op.apply(field.system(), Array2::zeros([32, 32])),
            Err(Error::StaleTemplate(_))
        ));
        op.refresh(field.system()).unwrap();
        assert!(op.apply(field.system(), Array2::zeros([32, 32])).is_ok());
    }

    #[test]
    fn shape_is_checked() {
        let field = qxga_like([32, 32]);
        let mut op = Operation::from(Bessel::new(3.824, 2.689));
        op.refresh(field.system()).unwrap();
        assert!(matches!(
            op.apply(field.system(), Array2::zeros([16, 32])),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn uncalibrated_bandpass_is_an_error() {
        let field = qxga_like([16, 16]);
        let op = Operation::from(AnnularMask::new(3.824, 2.689));
        assert_eq!(op.composition(), Composition::Multiplicative);
        assert!(matches!(
            op.apply(field.system(), Array2::zeros([16, 16])),
            Err(Error::Uncalibrated)
        ));
    }
}

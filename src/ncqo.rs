//! Numerically controlled quadrature oscillator.
//!
//! Base primitive for the PLL, the Costas loop, and the softtuner.
use log::error;

use crate::{Complex, Float, PI};

const TWO_PI: Float = 2.0 * PI;

/// Samples precomputed per refill, in fixed mode.
pub const PRECALC_LEN: usize = 1024;

/// Precomputed samples for a fixed frequency oscillator.
#[derive(Debug, Clone)]
struct Table {
    i: Vec<Float>,
    q: Vec<Float>,
    p: usize,
    phi0: Float,
}

/// Numerically controlled quadrature oscillator.
///
/// Frequencies are normalized: 1.0 is the Nyquist frequency, so the phase
/// advances by `pi * freq` radians per sample.
///
/// Reading returns the current value, then steps the phase. The cosine
/// (`i`) and sine (`q`) are computed lazily and cached independently, so
/// that reading only one of them costs one transcendental call.
#[derive(Debug, Clone)]
pub struct Ncqo {
    phi: Float,
    omega: Float,
    i: Float,
    q: Float,
    cos_valid: bool,
    sin_valid: bool,
    table: Option<Table>,
}

fn wrap(phi: Float) -> Float {
    if !phi.is_finite() {
        return 0.0;
    }
    let phi = phi.rem_euclid(TWO_PI);
    // Tiny negative inputs round up to exactly one period.
    if phi >= TWO_PI { 0.0 } else { phi }
}

impl Ncqo {
    /// Create new oscillator at normalized frequency `freq`, with phase 0.
    pub fn new(freq: Float) -> Self {
        Self {
            phi: 0.0,
            omega: crate::norm2ang_freq(freq),
            i: 1.0,
            q: 0.0,
            cos_valid: true,
            sin_valid: true,
            table: None,
        }
    }

    /// Create new fixed frequency oscillator.
    ///
    /// Samples are precomputed in batches of [`PRECALC_LEN`]. Frequency and
    /// phase can't be changed afterwards.
    pub fn new_fixed(freq: Float) -> Self {
        let mut ret = Self::new(freq);
        let mut table = Table {
            i: vec![0.0; PRECALC_LEN],
            q: vec![0.0; PRECALC_LEN],
            p: 0,
            phi0: 0.0,
        };
        ret.fill(&mut table);
        ret.table = Some(table);
        ret
    }

    fn fill(&mut self, table: &mut Table) {
        table.phi0 = self.phi;
        for n in 0..PRECALC_LEN {
            table.i[n] = self.phi.cos();
            table.q[n] = self.phi.sin();
            self.step();
        }
        table.p = 0;
    }

    /// Return true if this is a fixed frequency oscillator.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        self.table.is_some()
    }

    fn step(&mut self) {
        self.phi = wrap(self.phi + self.omega);
        self.cos_valid = false;
        self.sin_valid = false;
    }

    /// Advance fixed mode table, returning the current entry.
    fn table_next(&mut self) -> Option<(Float, Float)> {
        let mut table = self.table.take()?;
        if table.p == PRECALC_LEN {
            self.fill(&mut table);
        }
        let ret = (table.i[table.p], table.q[table.p]);
        table.p += 1;
        self.table = Some(table);
        Some(ret)
    }

    fn table_peek(&self) -> Option<(Float, Float)> {
        let table = self.table.as_ref()?;
        if table.p == PRECALC_LEN {
            // The next batch starts at the current phase.
            return Some((self.phi.cos(), self.phi.sin()));
        }
        Some((table.i[table.p], table.q[table.p]))
    }

    /// Current in-phase value, without stepping.
    #[must_use]
    pub fn get_i(&mut self) -> Float {
        if let Some((i, _)) = self.table_peek() {
            return i;
        }
        if !self.cos_valid {
            self.i = self.phi.cos();
            self.cos_valid = true;
        }
        self.i
    }

    /// Current quadrature value, without stepping.
    #[must_use]
    pub fn get_q(&mut self) -> Float {
        if let Some((_, q)) = self.table_peek() {
            return q;
        }
        if !self.sin_valid {
            self.q = self.phi.sin();
            self.sin_valid = true;
        }
        self.q
    }

    /// Current complex value, without stepping.
    #[must_use]
    pub fn get(&mut self) -> Complex {
        Complex::new(self.get_i(), self.get_q())
    }

    /// Return the in-phase value, and step.
    pub fn read_i(&mut self) -> Float {
        if let Some((i, _)) = self.table_next() {
            return i;
        }
        let ret = self.get_i();
        self.step();
        self.i = self.phi.cos();
        self.cos_valid = true;
        ret
    }

    /// Return the quadrature value, and step.
    pub fn read_q(&mut self) -> Float {
        if let Some((_, q)) = self.table_next() {
            return q;
        }
        let ret = self.get_q();
        self.step();
        self.q = self.phi.sin();
        self.sin_valid = true;
        ret
    }

    /// Return the complex value, and step.
    pub fn read(&mut self) -> Complex {
        if let Some((i, q)) = self.table_next() {
            return Complex::new(i, q);
        }
        let ret = self.get();
        self.step();
        ret
    }

    fn check_mutable(&self, what: &str) -> bool {
        if self.is_fixed() {
            error!("Ncqo: can't {what} of a fixed oscillator");
            return false;
        }
        true
    }

    /// Phase, in radians in `[0, 2pi)`.
    #[must_use]
    pub fn phase(&self) -> Float {
        match &self.table {
            // The table was computed ahead of the read position.
            Some(t) => wrap(t.phi0 + t.p as Float * self.omega),
            None => self.phi,
        }
    }

    /// Angular frequency, in radians per sample.
    #[must_use]
    pub fn angfreq(&self) -> Float {
        self.omega
    }

    /// Normalized frequency.
    #[must_use]
    pub fn freq(&self) -> Float {
        crate::ang2norm_freq(self.omega)
    }

    /// Set phase, in radians.
    pub fn set_phase(&mut self, phi: Float) {
        if self.check_mutable("set phase") {
            self.phi = wrap(phi);
            self.cos_valid = false;
            self.sin_valid = false;
        }
    }

    /// Add to phase, in radians.
    pub fn inc_phase(&mut self, delta: Float) {
        if self.check_mutable("increment phase") {
            self.phi = wrap(self.phi + delta);
            self.cos_valid = false;
            self.sin_valid = false;
        }
    }

    /// Set angular frequency, in radians per sample.
    pub fn set_angfreq(&mut self, omega: Float) {
        if self.check_mutable("set frequency") {
            self.omega = omega;
        }
    }

    /// Add to angular frequency, in radians per sample.
    pub fn inc_angfreq(&mut self, delta: Float) {
        if self.check_mutable("increment frequency") {
            self.omega += delta;
        }
    }

    /// Set normalized frequency.
    pub fn set_freq(&mut self, freq: Float) {
        self.set_angfreq(crate::norm2ang_freq(freq));
    }

    /// Add to normalized frequency.
    pub fn inc_freq(&mut self, delta: Float) {
        self.inc_angfreq(crate::norm2ang_freq(delta));
    }
}

/*! Phase locked loop.

Second order loop tracking the phase and frequency of a carrier with an
[`Ncqo`].

<https://en.wikipedia.org/wiki/Phase-locked_loop>
*/
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ncqo::Ncqo;
use crate::single_pole_iir::SinglePoleIIR;
use crate::{Complex, Error, Float, Result};

/// Damping factor of the loop.
const DAMPING: Float = 0.707;

/// PLL construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PllParams {
    /// Initial frequency guess, normalized (1.0 is Nyquist).
    pub fhint: Float,

    /// Loop cutoff frequency, normalized.
    pub fc: Float,
}

impl Default for PllParams {
    fn default() -> Self {
        Self {
            fhint: 0.0,
            fc: 0.01,
        }
    }
}

impl PllParams {
    /// Check parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.fhint.is_finite() || self.fhint.abs() > 1.0 {
            return Err(Error::invalid(format!(
                "PLL frequency hint {} not in [-1, 1]",
                self.fhint
            )));
        }
        check_cutoff(self.fc)
    }
}

fn check_cutoff(fc: Float) -> Result<()> {
    if !(fc > 0.0 && fc <= 1.0) {
        return Err(Error::invalid(format!("PLL cutoff {fc} not in (0, 1]")));
    }
    Ok(())
}

/// Loop gains for a critically damped second order loop.
///
/// Returns `(alpha, beta)`: frequency gain and phase gain.
fn loop_gains(fc: Float) -> (Float, Float) {
    let fc = crate::norm2ang_freq(fc);
    let d = 1.0 / (1.0 + 2.0 * DAMPING * fc + fc * fc);
    (4.0 * fc * fc * d, 4.0 * DAMPING * fc * d)
}

/// Phase locked loop.
#[derive(Debug, Clone)]
pub struct Pll {
    alpha: Float,
    beta: Float,
    lock: SinglePoleIIR<Float>,
    ncqo: Ncqo,
}

impl Pll {
    /// Create new PLL.
    pub fn new(params: &PllParams) -> Result<Self> {
        params.validate()?;
        let (alpha, beta) = loop_gains(params.fc);
        let lock = SinglePoleIIR::new(beta)
            .ok_or_else(|| Error::Internal(format!("PLL lock gain {beta} out of range")))?;
        debug!(
            "Pll: fhint {} fc {} alpha {alpha} beta {beta}",
            params.fhint, params.fc
        );
        Ok(Self {
            alpha,
            beta,
            lock,
            ncqo: Ncqo::new(params.fhint),
        })
    }

    /// Change loop cutoff frequency, normalized.
    pub fn set_cutoff(&mut self, fc: Float) -> Result<()> {
        check_cutoff(fc)?;
        let (alpha, beta) = loop_gains(fc);
        self.lock
            .set_taps(beta)
            .ok_or_else(|| Error::Internal(format!("PLL lock gain {beta} out of range")))?;
        self.alpha = alpha;
        self.beta = beta;
        Ok(())
    }

    /// Track a complex carrier.
    ///
    /// Returns the input mixed down by the local oscillator. Once locked
    /// this is close to a real constant.
    pub fn track(&mut self, x: Complex) -> Complex {
        let phase = self.ncqo.phase();
        let reference = self.ncqo.read();
        let mix = x * reference.conj();
        let err = crate::phase_adjust(crate::arg(x) - phase);
        self.ncqo.inc_angfreq(self.alpha * err);
        self.ncqo.inc_phase(self.beta * err);
        self.lock.filter(mix.re);
        mix
    }

    /// Track a real carrier, such as the pilot of an AM signal.
    ///
    /// The frequency is never pushed below zero.
    pub fn feed(&mut self, x: Float) {
        let s = self.ncqo.read();
        let err = -x * s.im;
        self.lock.filter(2.0 * x * s.re);
        if self.ncqo.angfreq() + self.alpha * err >= 0.0 {
            self.ncqo.inc_angfreq(self.alpha * err);
        }
        self.ncqo.inc_phase(self.beta * err);
    }

    /// Lock metric. Approaches the carrier amplitude when locked.
    #[must_use]
    pub fn lock(&self) -> Float {
        self.lock.get()
    }

    /// Current frequency estimate, normalized.
    #[must_use]
    pub fn freq(&self) -> Float {
        self.ncqo.freq()
    }

    /// Current oscillator phase, in radians.
    #[must_use]
    pub fn phase(&self) -> Float {
        self.ncqo.phase()
    }

    /// Loop gains, `(alpha, beta)`.
    #[must_use]
    pub fn gains(&self) -> (Float, Float) {
        (self.alpha, self.beta)
    }
}

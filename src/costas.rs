/*! Costas loop carrier recovery for phase shift keyed signals.

A [`Pll`](crate::pll::Pll) variant with a modulation specific phase
detector, so that the data modulation doesn't disturb the loop.

The mixed signal goes through an "arm" filter before phase detection:
* order 1: no filtering.
* order 2 to 19: Butterworth IIR.
* order 20 and up: windowed sinc FIR with `order` taps.

<https://en.wikipedia.org/wiki/Costas_loop>
*/
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::fir::{FirFilter, low_pass};
use crate::iir_filter::{Filter, IdentityFilter, butterworth_lowpass};
use crate::ncqo::Ncqo;
use crate::single_pole_iir::SinglePoleIIR;
use crate::window::WindowType;
use crate::{Complex, Error, Float, PI, Result};

/// Arm filters of at least this order are FIR.
pub const FIR_MIN_ORDER: usize = 20;

const SQRT2_MINUS_1: Float = std::f64::consts::SQRT_2 as Float - 1.0;

/// Modulation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostasKind {
    /// No phase detector. Feeding produces zeroes.
    None,
    /// Binary PSK.
    #[default]
    Bpsk,
    /// Quadrature PSK.
    Qpsk,
    /// 8-PSK.
    Psk8,
}

/// Costas loop construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CostasParams {
    /// Modulation.
    pub kind: CostasKind,
    /// Carrier frequency guess, normalized (1.0 is Nyquist).
    pub fhint: Float,
    /// Arm filter bandwidth, normalized.
    pub arm_bw: Float,
    /// Arm filter order. 1 means no filter.
    pub arm_order: usize,
    /// Window for the FIR arm filter, used from order 20 up.
    pub arm_window: WindowType,
    /// Loop bandwidth, in cycles per sample.
    pub loop_bw: Float,
}

impl Default for CostasParams {
    fn default() -> Self {
        Self {
            kind: CostasKind::Bpsk,
            fhint: 0.0,
            arm_bw: 0.25,
            arm_order: 3,
            arm_window: WindowType::Hamming,
            loop_bw: 0.005,
        }
    }
}

impl CostasParams {
    /// Check parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.fhint.is_finite() || self.fhint.abs() > 1.0 {
            return Err(Error::invalid(format!(
                "Costas frequency hint {} not in [-1, 1]",
                self.fhint
            )));
        }
        if self.arm_order == 0 {
            return Err(Error::invalid("Costas arm filter order must be at least 1"));
        }
        if self.arm_order > 1 && !(self.arm_bw > 0.0 && self.arm_bw < 1.0) {
            return Err(Error::invalid(format!(
                "Costas arm bandwidth {} not in (0, 1)",
                self.arm_bw
            )));
        }
        if !(self.loop_bw > 0.0 && self.loop_bw <= 0.5) {
            return Err(Error::invalid(format!(
                "Costas loop bandwidth {} not in (0, 0.5]",
                self.loop_bw
            )));
        }
        Ok(())
    }
}

fn arm_filter(params: &CostasParams) -> Result<Box<dyn Filter>> {
    let cutoff = params.arm_bw / 2.0;
    Ok(match params.arm_order {
        1 => Box::new(IdentityFilter),
        o if o < FIR_MIN_ORDER => Box::new(butterworth_lowpass(o, cutoff)?),
        o => Box::new(FirFilter::new(&low_pass(o, cutoff, &params.arm_window)?)?),
    })
}

/// Costas loop.
pub struct Costas {
    kind: CostasKind,
    a: Float,
    b: Float,
    lock: Float,
    arm: Box<dyn Filter>,
    z: Complex,
    y: SinglePoleIIR<Complex>,
    gain: Float,
    e: Float,
    ncqo: Ncqo,
    reported: bool,
}

impl Costas {
    /// Create new Costas loop.
    pub fn new(params: &CostasParams) -> Result<Self> {
        params.validate()?;
        let arm = arm_filter(params)?;
        let a = 2.0 * PI * params.loop_bw;
        debug!("Costas: {params:?}, a {a}");
        Ok(Self {
            kind: params.kind,
            a,
            b: a * a / 2.0,
            lock: 0.0,
            arm,
            z: Complex::default(),
            y: SinglePoleIIR::new(1.0)
                .ok_or_else(|| Error::Internal("Costas output smoother".into()))?,
            gain: 1.0,
            e: 0.0,
            ncqo: Ncqo::new(params.fhint),
            reported: false,
        })
    }

    fn detect(&self, z: Complex) -> Float {
        let l = Complex::new(z.re.signum(), z.im.signum());
        match self.kind {
            CostasKind::None => 0.0,
            CostasKind::Bpsk => -z.re * z.im,
            CostasKind::Qpsk => l.re * z.im - l.im * z.re,
            CostasKind::Psk8 => {
                if z.re.abs() >= z.im.abs() {
                    l.re * z.im - SQRT2_MINUS_1 * l.im * z.re
                } else {
                    SQRT2_MINUS_1 * l.re * z.im - l.im * z.re
                }
            }
        }
    }

    /// Feed one sample, returning the carrier corrected (and optionally
    /// smoothed) output.
    pub fn feed(&mut self, x: Complex) -> Complex {
        if self.kind == CostasKind::None {
            if !self.reported {
                error!("Costas: no modulation kind set, output is zero");
                self.reported = true;
            }
            return Complex::default();
        }
        let s = self.ncqo.read();
        self.z = self.arm.filter(x * s.conj() * self.gain);
        self.e = self.detect(self.z);
        self.lock += self.a * (1.0 - self.e - self.lock);
        self.ncqo.inc_angfreq(self.b * self.e);
        self.ncqo.inc_phase(self.a * self.e);
        self.y.filter(self.z)
    }

    /// Change modulation kind.
    pub fn set_kind(&mut self, kind: CostasKind) {
        self.kind = kind;
        self.reported = false;
    }

    /// Change the gain applied to the mixed signal.
    pub fn set_loop_gain(&mut self, gain: Float) {
        self.gain = gain;
    }

    /// Change output smoothing factor, in `[0, 1]`. 1 disables smoothing.
    pub fn set_output_alpha(&mut self, alpha: Float) -> Result<()> {
        self.y
            .set_taps(alpha)
            .ok_or_else(|| Error::invalid(format!("Costas output alpha {alpha} not in [0, 1]")))
    }

    /// Re-seed the oscillator frequency, normalized.
    pub fn set_freq(&mut self, freq: Float) {
        self.ncqo.set_freq(freq);
    }

    /// Modulation kind.
    #[must_use]
    pub fn kind(&self) -> CostasKind {
        self.kind
    }

    /// Lock metric. Approaches 1 when locked.
    #[must_use]
    pub fn lock(&self) -> Float {
        self.lock
    }

    /// Frequency estimate, normalized.
    #[must_use]
    pub fn freq(&self) -> Float {
        self.ncqo.freq()
    }

    /// Oscillator phase, in radians.
    #[must_use]
    pub fn phase(&self) -> Float {
        self.ncqo.phase()
    }

    /// Last phase error.
    #[must_use]
    pub fn error(&self) -> Float {
        self.e
    }

    /// Last arm filter output.
    #[must_use]
    pub fn z(&self) -> Complex {
        self.z
    }

    /// Last output.
    #[must_use]
    pub fn y(&self) -> Complex {
        self.y.get()
    }
}

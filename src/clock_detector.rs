/*! Symbol clock recovery.

Recovers symbol timing from a carrier corrected signal, producing one
sample per symbol into its own [`Stream`](crate::stream::Stream).

The only algorithm implemented is Gardner's, which needs two samples per
symbol: one at the symbol center, and one at the transition in between.
Those are interpolated from the input at half symbol intervals, so the
input may have any (non-integer) number of samples per symbol.

<https://wirelesspi.com/gardner-timing-error-detector-a-non-data-aided-version-of-zero-crossing-timing-error-detectors/>
*/
use log::{debug, error};
use serde::{Deserialize, Serialize};

use crate::port::PortReader;
use crate::stream::{Streamp, new_streamp};
use crate::{Complex, Error, Float, Result};

/// Timing error detection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockAlgorithm {
    /// Nothing. Produces no output.
    None,
    /// Gardner timing error detector.
    #[default]
    Gardner,
}

/// Clock detector construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClockDetectorParams {
    /// Timing error detector.
    pub algorithm: ClockAlgorithm,
    /// Gain applied to the timing error.
    pub loop_gain: Float,
    /// Baud rate guess, as a fraction of the sample rate.
    pub bhint: Float,
    /// Size of the symbol stream.
    pub bufsiz: usize,
    /// Phase correction gain.
    pub alpha: Float,
    /// Baud rate correction gain.
    pub beta: Float,
    /// Lowest allowed baud rate.
    pub bmin: Float,
    /// Highest allowed baud rate.
    pub bmax: Float,
}

impl Default for ClockDetectorParams {
    fn default() -> Self {
        Self {
            algorithm: ClockAlgorithm::Gardner,
            loop_gain: 1.0,
            bhint: 0.1,
            bufsiz: 4096,
            alpha: 0.1,
            beta: 1e-5,
            bmin: 0.0,
            bmax: MAX_BNOR,
        }
    }
}

/// Highest usable baud rate. The detector needs two samples per symbol.
pub const MAX_BNOR: Float = 0.5;

fn check_limits(bmin: Float, bmax: Float) -> Result<()> {
    if !(bmin >= 0.0 && bmax <= MAX_BNOR) {
        return Err(Error::invalid(format!(
            "baud rate limits [{bmin}, {bmax}] not within [0, {MAX_BNOR}]"
        )));
    }
    if bmin > bmax {
        return Err(Error::invalid(format!(
            "lower baud rate limit {bmin} above upper limit {bmax}"
        )));
    }
    Ok(())
}

impl ClockDetectorParams {
    /// Check parameters.
    pub fn validate(&self) -> Result<()> {
        check_limits(self.bmin, self.bmax)?;
        if !(self.bhint > 0.0 && self.bhint >= self.bmin && self.bhint <= self.bmax) {
            return Err(Error::invalid(format!(
                "baud rate hint {} not positive and within [{}, {}]",
                self.bhint, self.bmin, self.bmax
            )));
        }
        if self.bufsiz == 0 {
            return Err(Error::invalid("clock detector buffer size must be non-zero"));
        }
        for (name, v) in [
            ("loop gain", self.loop_gain),
            ("alpha", self.alpha),
            ("beta", self.beta),
        ] {
            if !v.is_finite() {
                return Err(Error::invalid(format!("clock detector {name} is {v}")));
            }
        }
        Ok(())
    }
}

/// Symbol clock detector.
pub struct ClockDetector {
    algorithm: ClockAlgorithm,
    alpha: Float,
    beta: Float,
    gain: Float,
    bnor: Float,
    bmin: Float,
    bmax: Float,
    phi: Float,
    halfcycle: bool,
    // Interpolated samples: newest symbol center, transition, previous
    // symbol center.
    x: [Complex; 3],
    prev: Complex,
    e: Float,
    out: Streamp,
    reader: PortReader,
    reported: bool,
}

impl ClockDetector {
    /// Create new clock detector.
    pub fn new(params: &ClockDetectorParams) -> Result<Self> {
        params.validate()?;
        let out = new_streamp(params.bufsiz)?;
        debug!("ClockDetector: {params:?}");
        Ok(Self {
            algorithm: params.algorithm,
            alpha: params.alpha,
            beta: params.beta,
            gain: params.loop_gain,
            bnor: params.bhint,
            bmin: params.bmin,
            bmax: params.bmax,
            phi: 0.0,
            halfcycle: false,
            x: [Complex::default(); 3],
            prev: Complex::default(),
            e: 0.0,
            reader: PortReader::plug(out.clone()),
            out,
            reported: false,
        })
    }

    /// Feed one sample.
    pub fn feed(&mut self, val: Complex) -> Result<()> {
        match self.algorithm {
            ClockAlgorithm::Gardner => self.gardner(val),
            ClockAlgorithm::None => {
                if !self.reported {
                    error!("ClockDetector: no algorithm selected, producing nothing");
                    self.reported = true;
                }
                Ok(())
            }
        }
    }

    /// Feed many samples, returning the number of symbols produced.
    pub fn feed_slice(&mut self, data: &[Complex]) -> Result<usize> {
        let before = self.out.borrow().pos();
        for x in data {
            self.feed(*x)?;
        }
        Ok((self.out.borrow().pos() - before) as usize)
    }

    fn gardner(&mut self, val: Complex) -> Result<()> {
        self.phi += self.bnor;
        if self.phi >= 0.5 {
            let a = self.bnor * (self.phi - 0.5);
            let p = val * (1.0 - a) + self.prev * a;
            self.phi -= 0.5;
            self.halfcycle = !self.halfcycle;
            if self.halfcycle {
                self.x[1] = p;
            } else {
                self.x[2] = self.x[0];
                self.x[0] = p;
                self.e = self.gain * (self.x[1].conj() * (self.x[0] - self.x[2])).re;
                self.phi += self.alpha * self.e;
                self.bnor = (self.bnor + self.beta * self.e).clamp(self.bmin, self.bmax);
                self.out.borrow_mut().write(&[p])?;
            }
        }
        self.prev = val;
        Ok(())
    }

    /// Read recovered symbols.
    ///
    /// If the symbol stream was overrun since the last read, the read
    /// position is moved to the oldest retained symbol and zero is
    /// returned for this call.
    pub fn read(&mut self, buf: &mut [Complex]) -> Result<usize> {
        Ok(self.reader.read_or_skip(buf)?)
    }

    /// Symbol stream, for plugging other readers into.
    #[must_use]
    pub fn output(&self) -> Streamp {
        self.out.clone()
    }

    /// Close the symbol stream.
    pub fn close(&mut self) {
        self.out.borrow_mut().close();
    }

    /// Set baud rate, as a fraction of the sample rate.
    pub fn set_baud(&mut self, bnor: Float) -> Result<()> {
        if !(bnor > 0.0 && bnor >= self.bmin && bnor <= self.bmax) {
            return Err(Error::invalid(format!(
                "baud rate {bnor} not positive and within [{}, {}]",
                self.bmin, self.bmax
            )));
        }
        self.bnor = bnor;
        Ok(())
    }

    /// Set baud rate limits. The current baud rate is clamped into them.
    pub fn set_bnor_limits(&mut self, bmin: Float, bmax: Float) -> Result<()> {
        check_limits(bmin, bmax)?;
        self.bmin = bmin;
        self.bmax = bmax;
        self.bnor = self.bnor.clamp(bmin, bmax);
        Ok(())
    }

    /// Set timing error gain.
    pub fn set_gain(&mut self, gain: Float) {
        self.gain = gain;
    }

    /// Set timing error detector.
    pub fn set_algorithm(&mut self, algorithm: ClockAlgorithm) {
        self.algorithm = algorithm;
        self.reported = false;
    }

    /// Current baud rate estimate.
    #[must_use]
    pub fn bnor(&self) -> Float {
        self.bnor
    }

    /// Baud rate limits.
    #[must_use]
    pub fn limits(&self) -> (Float, Float) {
        (self.bmin, self.bmax)
    }

    /// Symbol phase.
    #[must_use]
    pub fn phi(&self) -> Float {
        self.phi
    }

    /// Last timing error.
    #[must_use]
    pub fn error(&self) -> Float {
        self.e
    }

    /// Symbols lost by [`ClockDetector::read`] to overruns.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.reader.lost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PI;

    fn params(bnor: Float) -> ClockDetectorParams {
        ClockDetectorParams {
            bhint: bnor,
            bmin: bnor * 0.9,
            bmax: bnor * 1.1,
            ..Default::default()
        }
    }

    fn tone(bnor: Float, offset: Float, n: usize) -> Vec<Complex> {
        (0..n)
            .map(|i| Complex::new((PI * bnor * (i as Float + offset)).cos(), 0.0))
            .collect()
    }

    #[test]
    fn stable_at_hinted_rate() -> Result<()> {
        let n = 4000;
        for bnor in [0.125, 0.1, 0.0625] {
            for offset in [0.0, 0.3, 0.77] {
                let mut cd = ClockDetector::new(&params(bnor))?;
                let mut produced = 0;
                for x in tone(bnor, offset, n) {
                    produced += cd.feed_slice(&[x])?;
                    let b = cd.bnor();
                    assert!((bnor * 0.9..=bnor * 1.1).contains(&b), "bnor {b}");
                }
                let want = (n as Float * bnor).floor() as usize;
                assert!(
                    produced + 1 >= want && produced <= want + 1,
                    "bnor {bnor} offset {offset}: got {produced} want {want}"
                );
                let mut buf = vec![Complex::default(); n];
                assert_eq!(cd.read(&mut buf)?, produced);
            }
        }
        Ok(())
    }

    #[test]
    fn overrun_resyncs() -> Result<()> {
        let mut cd = ClockDetector::new(&ClockDetectorParams {
            bufsiz: 16,
            ..params(0.25)
        })?;
        let produced = cd.feed_slice(&tone(0.25, 0.0, 400))?;
        assert!(produced > 16);
        let mut buf = vec![Complex::default(); 64];
        assert_eq!(cd.read(&mut buf)?, 0);
        assert_eq!(cd.lost(), produced as u64 - 16);
        assert_eq!(cd.read(&mut buf)?, 16);
        assert_eq!(cd.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn independent_reader() -> Result<()> {
        let mut cd = ClockDetector::new(&params(0.1))?;
        let mut other = PortReader::plug(cd.output());
        let produced = cd.feed_slice(&tone(0.1, 0.0, 1000))?;
        let mut a = vec![Complex::default(); 200];
        let mut b = vec![Complex::default(); 200];
        assert_eq!(cd.read(&mut a)?, produced);
        assert_eq!(other.read(&mut b)?, produced);
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn limits_apply() -> Result<()> {
        let mut cd = ClockDetector::new(&params(0.1))?;
        cd.set_bnor_limits(0.2, 0.3)?;
        assert_eq!(cd.limits(), (0.2, 0.3));
        assert_eq!(cd.bnor(), 0.2);
        cd.feed_slice(&tone(0.1, 0.3, 1000))?;
        assert!((0.2..=0.3).contains(&cd.bnor()));
        assert!(cd.set_bnor_limits(0.3, 0.2).is_err());
        assert!(cd.set_bnor_limits(0.2, 0.8).is_err());
        assert_eq!(cd.limits(), (0.2, 0.3));
        assert!(cd.set_baud(0.1).is_err());
        cd.set_baud(0.25)?;
        assert_eq!(cd.bnor(), 0.25);
        Ok(())
    }

    #[test]
    fn no_algorithm() -> Result<()> {
        let mut cd = ClockDetector::new(&ClockDetectorParams {
            algorithm: ClockAlgorithm::None,
            ..params(0.1)
        })?;
        assert_eq!(cd.feed_slice(&tone(0.1, 0.0, 1000))?, 0);
        cd.set_algorithm(ClockAlgorithm::Gardner);
        assert!(cd.feed_slice(&tone(0.1, 0.0, 1000))? > 0);
        Ok(())
    }

    #[test]
    fn reject_params() {
        for p in [
            ClockDetectorParams {
                bmin: 0.3,
                bmax: 0.2,
                ..Default::default()
            },
            ClockDetectorParams {
                bhint: 0.5,
                bmin: 0.1,
                bmax: 0.2,
                ..Default::default()
            },
            ClockDetectorParams {
                bhint: 0.0,
                ..Default::default()
            },
            ClockDetectorParams {
                bhint: 0.75,
                bmin: 0.7,
                bmax: 0.8,
                ..Default::default()
            },
            ClockDetectorParams {
                bufsiz: 0,
                ..Default::default()
            },
            ClockDetectorParams {
                alpha: Float::NAN,
                ..Default::default()
            },
        ] {
            assert!(ClockDetector::new(&p).is_err(), "{p:?}");
        }
    }
}

/*! Software tuner. A digital downconverter.

Moves a frequency of interest down to zero, low pass filters, and
decimates. The oscillator runs before any decimation, otherwise the wanted
signal would alias.

Decimation is by block averaging: each output is the mean of `decimation`
consecutive (mixed, filtered) input samples.
*/
use log::debug;
use serde::{Deserialize, Serialize};

use crate::iir_filter::{Filter, IirFilter, butterworth_lowpass};
use crate::ncqo::Ncqo;
use crate::port::PortReader;
use crate::stream::{Streamp, new_streamp};
use crate::{Complex, Error, Float, Result};

/// Softtuner construction parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SofttunerParams {
    /// Input sample rate, in Hz.
    pub samp_rate: Float,
    /// Decimation factor.
    pub decimation: usize,
    /// Center frequency to move to zero, in Hz.
    pub fc: Float,
    /// Bandwidth to keep, in Hz. Filtering is skipped if this is the full
    /// sample rate.
    pub bw: Float,
    /// Anti alias filter order.
    pub aa_order: usize,
    /// Size of the output stream.
    pub bufsiz: usize,
}

impl Default for SofttunerParams {
    fn default() -> Self {
        Self {
            samp_rate: 1.0,
            decimation: 1,
            fc: 0.0,
            bw: 1.0,
            aa_order: 4,
            bufsiz: 4096,
        }
    }
}

impl SofttunerParams {
    /// Check parameters.
    pub fn validate(&self) -> Result<()> {
        if !(self.samp_rate > 0.0 && self.samp_rate.is_finite()) {
            return Err(Error::invalid(format!(
                "softtuner sample rate {} must be positive",
                self.samp_rate
            )));
        }
        if self.decimation == 0 {
            return Err(Error::invalid("softtuner decimation must be at least 1"));
        }
        if !(self.fc.abs() <= self.samp_rate / 2.0) {
            return Err(Error::invalid(format!(
                "softtuner center frequency {} outside +-{}",
                self.fc,
                self.samp_rate / 2.0
            )));
        }
        if !(self.bw > 0.0 && self.bw <= self.samp_rate) {
            return Err(Error::invalid(format!(
                "softtuner bandwidth {} not in (0, {}]",
                self.bw, self.samp_rate
            )));
        }
        if self.bw < self.samp_rate && self.aa_order == 0 {
            return Err(Error::invalid("softtuner anti alias filter order must be at least 1"));
        }
        if self.bufsiz == 0 {
            return Err(Error::invalid("softtuner buffer size must be non-zero"));
        }
        Ok(())
    }
}

/// Software tuner.
pub struct Softtuner {
    decimation: usize,
    scale: Float,
    fc: Float,
    bw: Float,
    lo: Ncqo,
    antialias: Option<IirFilter>,
    acc: Complex,
    count: usize,
    out: Streamp,
    reader: PortReader,
}

impl Softtuner {
    /// Create new softtuner.
    pub fn new(params: &SofttunerParams) -> Result<Self> {
        params.validate()?;
        let antialias = if params.bw < params.samp_rate {
            Some(butterworth_lowpass(
                params.aa_order,
                params.bw / 2.0 / params.samp_rate,
            )?)
        } else {
            None
        };
        let out = new_streamp(params.bufsiz)?;
        debug!("Softtuner: {params:?}");
        Ok(Self {
            decimation: params.decimation,
            scale: 1.0 / params.decimation as Float,
            fc: params.fc,
            bw: params.bw,
            lo: Ncqo::new_fixed(crate::abs2norm_freq(params.samp_rate, params.fc)),
            antialias,
            acc: Complex::default(),
            count: 0,
            reader: PortReader::plug(out.clone()),
            out,
        })
    }

    /// Feed one sample.
    pub fn feed(&mut self, x: Complex) -> Result<()> {
        let mut y = x * self.lo.read().conj();
        if let Some(f) = &mut self.antialias {
            y = f.filter(y);
        }
        if self.decimation == 1 {
            self.out.borrow_mut().write(&[y])?;
            return Ok(());
        }
        self.acc += y * self.scale;
        self.count += 1;
        if self.count == self.decimation {
            self.out.borrow_mut().write(&[self.acc])?;
            self.acc = Complex::default();
            self.count = 0;
        }
        Ok(())
    }

    /// Feed many samples, returning the number of samples produced.
    pub fn feed_slice(&mut self, data: &[Complex]) -> Result<usize> {
        let before = self.out.borrow().pos();
        for x in data {
            self.feed(*x)?;
        }
        Ok((self.out.borrow().pos() - before) as usize)
    }

    /// Read output samples.
    ///
    /// If the output was overrun since the last read, the read position
    /// is moved to the oldest retained sample and zero is returned for this
    /// call.
    pub fn read(&mut self, buf: &mut [Complex]) -> Result<usize> {
        Ok(self.reader.read_or_skip(buf)?)
    }

    /// Output stream, for plugging other readers into.
    #[must_use]
    pub fn output(&self) -> Streamp {
        self.out.clone()
    }

    /// Close the output stream.
    pub fn close(&mut self) {
        self.out.borrow_mut().close();
    }

    /// Decimation factor.
    #[must_use]
    pub fn decimation(&self) -> usize {
        self.decimation
    }

    /// Center frequency, in Hz.
    #[must_use]
    pub fn fc(&self) -> Float {
        self.fc
    }

    /// Bandwidth, in Hz.
    #[must_use]
    pub fn bw(&self) -> Float {
        self.bw
    }

    /// Return true if an anti alias filter is in use.
    #[must_use]
    pub fn is_filtered(&self) -> bool {
        self.antialias.is_some()
    }
}

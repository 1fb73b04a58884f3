/*! Finite impulse response filter.

Taps are real, samples are complex.
*/
use crate::iir_filter::Filter;
use crate::window::WindowType;
use crate::{Complex, Error, Float, Result};

/// Finite impulse response filter.
#[derive(Debug, Clone)]
pub struct FIR {
    taps: Vec<Float>,
}

impl FIR {
    /// Create new FIR.
    pub fn new(taps: &[Float]) -> Self {
        Self {
            taps: taps.iter().copied().rev().collect(),
        }
    }

    /// Number of taps.
    #[must_use]
    pub fn ntaps(&self) -> usize {
        self.taps.len()
    }

    /// Run filter once, creating one sample from the taps and an
    /// equal number of input samples, oldest first.
    pub fn filter(&self, input: &[Complex]) -> Complex {
        input
            .iter()
            .zip(&self.taps)
            .fold(Complex::default(), |acc, (x, t)| acc + *x * *t)
    }
}

/// Streaming FIR filter, one sample in and one sample out.
///
/// The delay line is stored twice, so that the latest `ntaps` samples are
/// always available as one contiguous slice.
#[derive(Debug, Clone)]
pub struct FirFilter {
    fir: FIR,
    history: Vec<Complex>,
    pos: usize,
}

impl FirFilter {
    /// Create streaming filter from taps. Fails if there are no taps.
    pub fn new(taps: &[Float]) -> Result<Self> {
        if taps.is_empty() {
            return Err(Error::invalid("FIR filter needs at least one tap"));
        }
        Ok(Self {
            fir: FIR::new(taps),
            history: vec![Complex::default(); 2 * taps.len()],
            pos: 0,
        })
    }

    /// Number of taps.
    #[must_use]
    pub fn ntaps(&self) -> usize {
        self.fir.ntaps()
    }
}

impl Filter for FirFilter {
    fn filter(&mut self, sample: Complex) -> Complex {
        let n = self.fir.ntaps();
        self.history[self.pos] = sample;
        self.history[self.pos + n] = sample;
        self.pos = (self.pos + 1) % n;
        self.fir.filter(&self.history[self.pos..self.pos + n])
    }
    fn reset(&mut self) {
        self.history.fill(Complex::default());
        self.pos = 0;
    }
}

/// Create taps for a windowed sinc low pass filter, normalized to unity DC
/// gain.
///
/// `cutoff` is in cycles per sample, in `(0, 0.5]`.
pub fn low_pass(ntaps: usize, cutoff: Float, window_type: &WindowType) -> Result<Vec<Float>> {
    if ntaps == 0 {
        return Err(Error::invalid("low pass filter needs at least one tap"));
    }
    if !(cutoff > 0.0 && cutoff <= 0.5) {
        return Err(Error::invalid(format!(
            "low pass cutoff {cutoff} not in (0, 0.5] cycles per sample"
        )));
    }
    let pi = std::f64::consts::PI as Float;
    let window = window_type.make_window(ntaps);
    let center = (ntaps - 1) as Float / 2.0;
    let fwt0 = 2.0 * pi * cutoff;
    let taps: Vec<_> = window
        .0
        .iter()
        .enumerate()
        .map(|(i, win)| {
            let n = i as Float - center;
            if n == 0.0 {
                fwt0 / pi * win
            } else {
                ((n * fwt0).sin() / (n * pi)) * win
            }
        })
        .collect();
    let sum: Float = taps.iter().sum();
    if sum.abs() < Float::EPSILON {
        return Err(Error::invalid(format!(
            "low pass filter of {ntaps} taps at {cutoff} has no DC gain"
        )));
    }
    Ok(taps.into_iter().map(|t| t / sum).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{assert_almost_equal_complex, assert_almost_equal_float};

    #[test]
    fn test_complex() {
        let input = vec![
            Complex::new(1.0, 0.0),
            Complex::new(2.0, 0.0),
            Complex::new(3.0, 0.2),
            Complex::new(4.1, 0.0),
            Complex::new(5.0, 0.0),
            Complex::new(6.0, 0.2),
        ];
        let filter = FIR::new(&[0.1, 1.0, 0.5]);
        let got: Vec<_> = input.windows(3).map(|w| filter.filter(w)).collect();
        assert_almost_equal_complex(
            &got,
            &[
                Complex::new(2.8, 0.02),
                Complex::new(4.41, 0.2),
                Complex::new(6.1, 0.1),
                Complex::new(7.65, 0.02),
            ],
        );
    }

    #[test]
    fn streaming_impulse() -> Result<()> {
        let taps = [0.25, 0.5, -1.0, 2.0];
        let mut f = FirFilter::new(&taps)?;
        let mut got = Vec::new();
        for i in 0..10 {
            let x = if i == 0 { 1.0 } else { 0.0 };
            got.push(f.filter(Complex::new(x, 0.0)).re);
        }
        assert_almost_equal_float(&got, &[0.25, 0.5, -1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        Ok(())
    }

    #[test]
    fn streaming_matches_block() -> Result<()> {
        let taps = low_pass(7, 0.2, &WindowType::Hamming)?;
        let input: Vec<_> = (0..30)
            .map(|i| Complex::new((i as Float * 0.3).sin(), (i as Float * 0.7).cos()))
            .collect();
        let mut f = FirFilter::new(&taps)?;
        let streamed: Vec<_> = input.iter().map(|x| f.filter(*x)).collect();
        let fir = FIR::new(&taps);
        let block: Vec<_> = input.windows(7).map(|w| fir.filter(w)).collect();
        assert_almost_equal_complex(&streamed[6..], &block);
        Ok(())
    }

    #[test]
    fn test_filter_generator() -> Result<()> {
        let taps = low_pass(25, 0.1, &WindowType::Hamming)?;
        assert_eq!(taps.len(), 25);
        assert_almost_equal_float(
            &taps,
            &[
                0.002010403,
                0.0016210203,
                7.851862e-10,
                -0.0044467063,
                -0.011685465,
                -0.018134259,
                -0.016773716,
                -3.6538055e-9,
                0.0358771,
                0.08697697,
                0.14148787,
                0.18345332,
                0.19922684,
                0.1834533,
                0.14148785,
                0.08697697,
                0.035877097,
                -3.6538053e-9,
                -0.016773716,
                -0.018134257,
                -0.011685458,
                -0.0044467044,
                7.851859e-10,
                0.0016210207,
                0.002010403,
            ],
        );
        Ok(())
    }

    #[test]
    fn even_taps_unity_gain() -> Result<()> {
        let taps = low_pass(20, 0.125, &WindowType::Hamming)?;
        assert_eq!(taps.len(), 20);
        let sum: Float = taps.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert_almost_equal_float(&taps[..10], &taps[10..].iter().rev().copied().collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn reject_bad_design() {
        assert!(low_pass(0, 0.1, &WindowType::Hamming).is_err());
        assert!(low_pass(5, 0.0, &WindowType::Hamming).is_err());
        assert!(low_pass(5, 0.6, &WindowType::Hamming).is_err());
        assert!(FirFilter::new(&[]).is_err());
    }
}

/*! Infinite impulse response filters.

The recursive filters here are cascades of second order sections
("biquads"), run in direct form II transposed. Low pass coefficients are
synthesized from the analog Butterworth prototype through the bilinear
transform, with the cutoff prewarped.

<https://en.wikipedia.org/wiki/Butterworth_filter>
<https://en.wikipedia.org/wiki/Bilinear_transform>
*/
use log::debug;

use crate::{Complex, Error, Float, PI, Result};

/// A filter processing one complex sample at a time.
pub trait Filter {
    /// Filter one sample.
    fn filter(&mut self, sample: Complex) -> Complex;

    /// Clear filter state, keeping the coefficients.
    fn reset(&mut self);
}

/// Filter that does nothing.
#[derive(Debug, Default, Clone)]
pub struct IdentityFilter;

impl Filter for IdentityFilter {
    fn filter(&mut self, sample: Complex) -> Complex {
        sample
    }
    fn reset(&mut self) {}
}

/// Second order section.
///
/// `H(z) = (b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`
#[derive(Debug, Clone)]
pub struct Biquad {
    b: [Float; 3],
    a: [Float; 2],
    s: [Complex; 2],
}

impl Biquad {
    /// Create new section from feedforward taps `b` and feedback taps `a`.
    ///
    /// The leading feedback tap is implicitly 1.
    pub fn new(b: [Float; 3], a: [Float; 2]) -> Self {
        Self {
            b,
            a,
            s: [Complex::default(); 2],
        }
    }
}

impl Filter for Biquad {
    fn filter(&mut self, x: Complex) -> Complex {
        let y = x * self.b[0] + self.s[0];
        self.s[0] = x * self.b[1] - y * self.a[0] + self.s[1];
        self.s[1] = x * self.b[2] - y * self.a[1];
        y
    }
    fn reset(&mut self) {
        self.s = [Complex::default(); 2];
    }
}

/// Cascade of second order sections.
#[derive(Debug, Clone)]
pub struct IirFilter {
    sections: Vec<Biquad>,
}

impl IirFilter {
    /// Create new filter from sections. Fails on an empty cascade.
    pub fn new(sections: Vec<Biquad>) -> Result<Self> {
        if sections.is_empty() {
            return Err(Error::invalid("IIR filter needs at least one section"));
        }
        Ok(Self { sections })
    }

    /// Number of poles.
    #[must_use]
    pub fn order(&self) -> usize {
        self.sections
            .iter()
            .map(|s| if s.a[1] == 0.0 && s.b[2] == 0.0 { 1 } else { 2 })
            .sum()
    }
}

impl Filter for IirFilter {
    fn filter(&mut self, sample: Complex) -> Complex {
        self.sections.iter_mut().fold(sample, |x, s| s.filter(x))
    }
    fn reset(&mut self) {
        self.sections.iter_mut().for_each(Biquad::reset);
    }
}

/// Design a Butterworth low pass filter.
///
/// `cutoff` is the -3dB point in cycles per sample, and must be in
/// `(0, 0.5)`. DC gain is unity.
pub fn butterworth_lowpass(order: usize, cutoff: Float) -> Result<IirFilter> {
    if order == 0 {
        return Err(Error::invalid("Butterworth order must be at least 1"));
    }
    if !(cutoff > 0.0 && cutoff < 0.5) {
        return Err(Error::invalid(format!(
            "Butterworth cutoff {cutoff} not in (0, 0.5) cycles per sample"
        )));
    }
    // Bilinear transform with T = 1.
    let k: Float = 2.0;
    let wc = k * (PI * cutoff).tan();
    let n = order as Float;

    let mut sections = Vec::with_capacity(order.div_ceil(2));
    for i in 0..order / 2 {
        // Left half plane pole, paired with its conjugate.
        let theta = PI * (2.0 * i as Float + n + 1.0) / (2.0 * n);
        let p = Complex::from_polar(wc, theta);
        let m = p.norm_sqr();
        let d = k * k - 2.0 * k * p.re + m;
        sections.push(Biquad::new(
            [m / d, 2.0 * m / d, m / d],
            [
                2.0 * (m - k * k) / d,
                (k * k + 2.0 * k * p.re + m) / d,
            ],
        ));
    }
    if order % 2 == 1 {
        let p = -wc;
        let g = -p / (k - p);
        sections.push(Biquad::new([g, g, 0.0], [-(k + p) / (k - p), 0.0]));
    }
    debug!("Butterworth: order {order}, cutoff {cutoff}, {} sections", sections.len());
    IirFilter::new(sections)
}

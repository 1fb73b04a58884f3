//! Single pole Infinite Impulse Response (IIR) smoother.
//!
//! `y[n] = y[n-1] + alpha * (x[n] - y[n-1])`
//!
//! Used for lock metrics and output smoothing.
use crate::Float;

/// Single pole IIR filter.
#[derive(Debug, Clone)]
pub struct SinglePoleIIR<T> {
    alpha: Float,
    one_minus_alpha: Float,
    prev_output: T,
}

impl<T> SinglePoleIIR<T>
where
    T: Copy + Default + std::ops::Mul<Float, Output = T> + std::ops::Add<Output = T>,
{
    /// Create new filter. `alpha` must be in `[0, 1]`.
    ///
    /// An alpha of 1 passes the input through unchanged.
    pub fn new(alpha: Float) -> Option<Self> {
        let mut r = Self {
            alpha: Float::default(),
            one_minus_alpha: Float::default(),
            prev_output: T::default(),
        };
        r.set_taps(alpha)?;
        Some(r)
    }

    /// Filter one sample.
    pub fn filter(&mut self, sample: T) -> T {
        let o: T = sample * self.alpha + self.prev_output * self.one_minus_alpha;
        self.prev_output = o;
        o
    }

    /// Change alpha. Returns None, without changing anything, if alpha is
    /// out of range.
    pub fn set_taps(&mut self, alpha: Float) -> Option<()> {
        if !(0.0..=1.0).contains(&alpha) {
            return None;
        }
        self.alpha = alpha;
        self.one_minus_alpha = 1.0 - alpha;
        Some(())
    }

    /// Current alpha.
    #[must_use]
    pub fn alpha(&self) -> Float {
        self.alpha
    }

    /// Last output.
    #[must_use]
    pub fn get(&self) -> T {
        self.prev_output
    }
}

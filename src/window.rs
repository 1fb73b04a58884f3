//! Window functions
//!
//! <https://en.wikipedia.org/wiki/Window_function>
//! <https://en.wikipedia.org/wiki/Spectral_leakage>
use serde::{Deserialize, Serialize};

use crate::Float;

const PI: Float = std::f64::consts::PI as Float;

/// A window.
pub struct Window(pub Vec<Float>);

/// Window type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowType {
    /// Rectangular. IOW no window.
    Rectangular,
    /// Hamming.
    #[default]
    Hamming,
    /// Blackman.
    Blackman,
    /// Blackman-Harris.
    BlackmanHarris,
}

impl WindowType {
    /// Create a window of this type.
    #[must_use]
    pub fn make_window(&self, ntaps: usize) -> Window {
        Window(match self {
            WindowType::Rectangular => vec![1.0; ntaps],
            WindowType::Hamming => hamming(ntaps),
            WindowType::Blackman => blackman(ntaps),
            WindowType::BlackmanHarris => blackman_harris(ntaps),
        })
    }
}

/// Create Hamming window.
///
/// <https://en.wikipedia.org/wiki/Window_function#Hann_and_Hamming_windows>
pub fn hamming(ntaps: usize) -> Vec<Float> {
    // a0 notes:
    //
    // 0.54 is commonly used, but Hamming's paper sets it as 25/46.
    //
    // "In the equiripple sense, the optimal values for the
    // coefficients are a0 = 0.53836 and a1 = 0.46164".
    //
    // See wikipedia.
    let a0 = 25.0 / 46.0;
    let a1 = 1.0 - a0;
    if ntaps < 2 {
        return vec![1.0; ntaps];
    }
    let m = (ntaps - 1) as Float;
    (0..ntaps)
        .map(|n| a0 - a1 * (2.0 * PI * (n as Float) / m).cos())
        .collect()
}

/// Create Blackman window.
///
/// <https://en.wikipedia.org/wiki/Window_function#Blackman_window>
pub fn blackman(m: usize) -> Vec<Float> {
    // Blackman's "not very serious proposal" magic value: 0.16.
    //
    // "exact Blackman" is:
    //   a0 = 7938/18608 ≈ 0.42659
    //   a1 = 9240/18608 ≈ 0.49656
    //   a2 = 1430/18608 ≈ 0.076849
    let a = 0.16;
    let a0 = (1.0 - a) / 2.0;
    let a1 = 0.5;
    let a2 = a / 2.0;
    (0..m)
        .map(|n| {
            let t1 = 2.0 * PI * n as Float / m as Float;
            a0 - a1 * t1.cos() + a2 * (2.0 * t1).cos()
        })
        .collect()
}

/// Create Blackman-Harris window.
///
/// <https://en.wikipedia.org/wiki/Window_function#Blackman%E2%80%93Harris_window>
pub fn blackman_harris(m: usize) -> Vec<Float> {
    const A0: Float = 0.35875;
    const A1: Float = 0.48829;
    const A2: Float = 0.14128;
    const A3: Float = 0.01168;
    (0..m)
        .map(|n| {
            let t1 = 2.0 * PI * n as Float / m as Float;
            A0 - A1 * t1.cos() + A2 * (2.0 * t1).cos() - A3 * (3.0 * t1).cos()
        })
        .collect()
}

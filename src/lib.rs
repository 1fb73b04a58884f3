/*! This crate provides the signal processing core of a software defined
radio receiver.

It takes a stream of complex baseband samples and does carrier
synchronization, symbol timing recovery and frequency translation with
decimation. Every processing stage is connected to the next through the same
streaming abstraction.

# Architecture overview

The signal flows from producers to consumers through [`stream::Stream`]s.
A stream is a fixed size ring buffer with one writer and any number of
readers. Readers don't live in the stream; each consumer holds its own
[`port::PortReader`] cursor into the absolute position space of the stream.

The producer never waits for a slow consumer. When the ring is full the
oldest samples are overwritten, and a consumer that was still pointing at
them gets a *desync* on its next read. It then resyncs to the oldest
retained sample and carries on. Memory and latency stay bounded, and data
is lost under overload.

Leaf to root:

```text
  [ Ncqo oscillator ]
           ↓
  [ Pll | Costas ]  (carrier recovery)
           ↓
  [ ClockDetector ] (Gardner symbol timing)
           ↓
    symbol stream

  [ Softtuner ] (mix, anti-alias filter, decimate)
           ↓
  narrowband stream
```

# Examples

Recover the carrier of a BPSK signal, and then the symbol clock.

```
use sigutils::blocks::{ClockDetectorParams, CostasKind, CostasParams};
use sigutils::blocks::{BlockConfig, VectorSource};
use sigutils::graph::{Graph, GraphRunner};
use sigutils::Complex;

let input: Vec<Complex> = (0..1000)
    .map(|n| Complex::from_polar(1.0, 0.1 * std::f32::consts::PI * n as f32))
    .collect();
let (src, prev) = VectorSource::new(input, 4096)?;
let costas = BlockConfig::Costas(CostasParams {
    kind: CostasKind::Bpsk,
    fhint: 0.1,
    ..Default::default()
});
let (costas, prev) = costas.build(prev)?;
let clock = BlockConfig::ClockDetector(ClockDetectorParams::default());
let (clock, _symbols) = clock.build(prev)?;

let mut g = Graph::new();
g.add(Box::new(src));
g.add(costas);
g.add(clock);
g.run()?;
# Ok::<(), sigutils::Error>(())
```
*/

pub mod block;
pub mod blocks;
pub mod clock_detector;
pub mod context;
pub mod costas;
pub mod fir;
pub mod graph;
pub mod iir_filter;
pub mod ncqo;
pub mod pll;
pub mod port;
pub mod single_pole_iir;
pub mod softtuner;
pub mod stream;
pub mod window;

/// Float type used. Usually f32, but not guaranteed.
pub type Float = f32;

/// Complex (I/Q) data.
pub type Complex = num_complex::Complex<Float>;

/// Pi, as [`Float`].
pub(crate) const PI: Float = std::f64::consts::PI as Float;

/// Sigutils error.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A parameter was out of range, or a combination of parameters was
    /// invalid. Construction fails atomically with this.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A configuration that is valid to construct but that can't be run.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Stream level error.
    #[error(transparent)]
    Stream(#[from] stream::StreamError),

    /// Port (flow control) level error.
    #[error(transparent)]
    Flow(#[from] port::FlowError),

    /// A broken invariant. Aborts the enclosing stage.
    #[error("internal error: {0}")]
    Internal(String),

    /// JSON config parse error.
    #[error("config: {0}")]
    Json(#[from] serde_json::Error),

    /// Wrapped error with context.
    #[error("{msg}: {source}")]
    Wrap {
        /// Context.
        msg: String,
        /// The underlying error.
        source: Box<Error>,
    },

    /// Free form error.
    #[error("{0}")]
    Msg(String),
}

impl Error {
    /// Create error from message.
    pub fn msg<S: Into<String>>(msg: S) -> Self {
        Self::Msg(msg.into())
    }

    /// Create an invalid argument error.
    pub fn invalid<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Wrap an error with some context.
    pub fn wrap<S: Into<String>>(e: Error, msg: S) -> Self {
        Self::Wrap {
            msg: msg.into(),
            source: Box::new(e),
        }
    }
}

/// Sigutils result.
pub type Result<T> = std::result::Result<T, Error>;

/// Wrap a phase (radians) into `(-pi, pi]`.
#[must_use]
pub(crate) fn phase_adjust(phase: Float) -> Float {
    const TWO_PI: Float = 2.0 * PI;
    if !phase.is_finite() {
        return 0.0;
    }
    // rem_euclid lands in [0, 2pi], so this is [-pi, pi].
    let p = (phase + PI).rem_euclid(TWO_PI) - PI;
    if p <= -PI { p + TWO_PI } else { p.min(PI) }
}

/// Angle of a complex number.
#[must_use]
pub(crate) fn arg(x: Complex) -> Float {
    #[cfg(feature = "fast-math")]
    {
        fast_math::atan2(x.im, x.re)
    }
    #[cfg(not(feature = "fast-math"))]
    {
        x.im.atan2(x.re)
    }
}

/// Convert normalized frequency (1.0 is Nyquist) to radians per sample.
#[must_use]
pub fn norm2ang_freq(f: Float) -> Float {
    PI * f
}

/// Convert radians per sample to normalized frequency (1.0 is Nyquist).
#[must_use]
pub fn ang2norm_freq(omega: Float) -> Float {
    omega / PI
}

/// Convert a frequency in Hz to normalized frequency, given the sample rate.
#[must_use]
pub fn abs2norm_freq(samp_rate: Float, f: Float) -> Float {
    2.0 * f / samp_rate
}

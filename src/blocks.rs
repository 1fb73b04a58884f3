/*! Blocks, and their configuration.

Every processing block kind has a typed parameter struct, and
[`BlockConfig`] is the closed set of them. A config can be loaded from
JSON, validated, and built into a block reading from an upstream stream.

```
use sigutils::blocks::BlockConfig;
let c = BlockConfig::from_json(r#"{"block": "costas", "kind": "qpsk", "fhint": 0.05}"#)?;
assert_eq!(c.name(), "Costas");
# Ok::<(), sigutils::Error>(())
```
*/
use std::cell::{Ref, RefCell};
use std::rc::Rc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::block::{Block, BlockRet, Map, MapProcess, Process, ProcessBlock};
use crate::port::{PortReader, PortState};
use crate::stream::{Streamp, new_streamp};
use crate::{Complex, Error, Result};

pub use crate::clock_detector::{ClockAlgorithm, ClockDetector, ClockDetectorParams};
pub use crate::costas::{Costas, CostasKind, CostasParams};
pub use crate::pll::{Pll, PllParams};
pub use crate::softtuner::{Softtuner, SofttunerParams};
pub use crate::window::WindowType;

/// Configuration of one processing block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "block", rename_all = "snake_case")]
pub enum BlockConfig {
    /// Phase locked loop, tracking a complex carrier.
    Pll(PllParams),
    /// Costas loop.
    Costas(CostasParams),
    /// Symbol clock recovery.
    ClockDetector(ClockDetectorParams),
    /// Digital downconverter.
    Softtuner(SofttunerParams),
}

impl BlockConfig {
    /// Parse and validate one block config.
    pub fn from_json(s: &str) -> Result<Self> {
        let c: Self = serde_json::from_str(s)?;
        c.validate()?;
        Ok(c)
    }

    /// Parse and validate a JSON array of block configs.
    pub fn chain_from_json(s: &str) -> Result<Vec<Self>> {
        let cs: Vec<Self> = serde_json::from_str(s)?;
        for (n, c) in cs.iter().enumerate() {
            c.validate()
                .map_err(|e| Error::wrap(e, format!("block {n} ({})", c.name())))?;
        }
        Ok(cs)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Name of the block kind.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BlockConfig::Pll(_) => "Pll",
            BlockConfig::Costas(_) => "Costas",
            BlockConfig::ClockDetector(_) => "ClockDetector",
            BlockConfig::Softtuner(_) => "Softtuner",
        }
    }

    /// Check parameters.
    pub fn validate(&self) -> Result<()> {
        match self {
            BlockConfig::Pll(p) => p.validate(),
            BlockConfig::Costas(p) => p.validate(),
            BlockConfig::ClockDetector(p) => p.validate(),
            BlockConfig::Softtuner(p) => p.validate(),
        }
    }

    /// Build the block, reading from `src`.
    ///
    /// Returns the block and its output stream. Blocks without a
    /// configured buffer size get one as large as the upstream stream.
    pub fn build(&self, src: Streamp) -> Result<(Box<dyn Block>, Streamp)> {
        self.build_inner(src)
            .map_err(|e| Error::wrap(e, format!("building {}", self.name())))
    }

    fn build_inner(&self, src: Streamp) -> Result<(Box<dyn Block>, Streamp)> {
        let chunk = src.borrow().capacity();
        let name = self.name();
        debug!("Building {name}, reading {chunk} at a time");
        Ok(match self {
            BlockConfig::Pll(p) => {
                let process = MapProcess::new(Pll::new(p)?, chunk)?;
                boxed(ProcessBlock::new(name, src, process, chunk))
            }
            BlockConfig::Costas(p) => {
                let process = MapProcess::new(Costas::new(p)?, chunk)?;
                boxed(ProcessBlock::new(name, src, process, chunk))
            }
            BlockConfig::ClockDetector(p) => {
                boxed(ProcessBlock::new(name, src, ClockDetector::new(p)?, chunk))
            }
            BlockConfig::Softtuner(p) => {
                boxed(ProcessBlock::new(name, src, Softtuner::new(p)?, chunk))
            }
        })
    }
}

fn boxed<B: Block + 'static>((b, out): (B, Streamp)) -> (Box<dyn Block>, Streamp) {
    (Box::new(b), out)
}

/// Build a chain of blocks, each reading from the previous one.
///
/// Returns the blocks, and the output stream of the last one.
pub fn build_chain(configs: &[BlockConfig], src: Streamp) -> Result<(Vec<Box<dyn Block>>, Streamp)> {
    let mut blocks = Vec::with_capacity(configs.len());
    let mut prev = src;
    for c in configs {
        let (b, out) = c.build(prev)?;
        blocks.push(b);
        prev = out;
    }
    Ok((blocks, prev))
}

impl Map for Pll {
    fn process_one(&mut self, x: Complex) -> Complex {
        self.track(x)
    }
}

impl Map for Costas {
    fn process_one(&mut self, x: Complex) -> Complex {
        self.feed(x)
    }
}

impl Process for ClockDetector {
    fn process(&mut self, input: &[Complex]) -> Result<usize> {
        self.feed_slice(input)
    }
    fn output(&self) -> Streamp {
        ClockDetector::output(self)
    }
}

impl Process for Softtuner {
    fn process(&mut self, input: &[Complex]) -> Result<usize> {
        self.feed_slice(input)
    }
    fn output(&self) -> Streamp {
        Softtuner::output(self)
    }
}

/// Generate values from a fixed vector.
pub struct VectorSource {
    data: Vec<Complex>,
    pos: usize,
    chunk: usize,
    dst: Streamp,
}

impl VectorSource {
    /// Create new vector source, with an output stream of `capacity`
    /// samples.
    ///
    /// Data is written half a stream at a time, so that a consumer reading
    /// once per graph iteration keeps up.
    pub fn new(data: Vec<Complex>, capacity: usize) -> Result<(Self, Streamp)> {
        let dst = new_streamp(capacity)?;
        Ok((
            Self {
                data,
                pos: 0,
                chunk: std::cmp::max(capacity / 2, 1),
                dst: dst.clone(),
            },
            dst,
        ))
    }
}

impl Block for VectorSource {
    fn block_name(&self) -> &str {
        "VectorSource"
    }
    fn work(&mut self) -> Result<BlockRet> {
        let n = std::cmp::min(self.chunk, self.data.len() - self.pos);
        if n == 0 {
            self.dst.borrow_mut().close();
            return Ok(BlockRet::EOF);
        }
        self.dst
            .borrow_mut()
            .write(&self.data[self.pos..self.pos + n])?;
        self.pos += n;
        Ok(BlockRet::Ok)
    }
}

/// Sink values into a vector.
///
/// Mostly useful for tests.
pub struct VectorSink {
    src: PortReader,
    buf: Vec<Complex>,
    storage: Rc<RefCell<Vec<Complex>>>,
    max_size: usize,
}

/// Hook into the data written to a [`VectorSink`].
pub struct Hook {
    inner: Rc<RefCell<Vec<Complex>>>,
}

impl Hook {
    /// Borrow the data received so far.
    #[must_use]
    pub fn data(&self) -> Ref<'_, Vec<Complex>> {
        self.inner.borrow()
    }
}

impl VectorSink {
    /// Create new sink, storing at most `max_size` samples.
    pub fn new(src: Streamp, max_size: usize) -> Self {
        let chunk = src.borrow().capacity();
        Self {
            src: PortReader::plug(src),
            buf: vec![Complex::default(); chunk],
            storage: Rc::new(RefCell::new(Vec::new())),
            max_size,
        }
    }

    /// Get a hook into the data that will be written.
    #[must_use]
    pub fn hook(&self) -> Hook {
        Hook {
            inner: self.storage.clone(),
        }
    }

    /// Samples lost to upstream overruns.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.src.lost()
    }
}

impl Block for VectorSink {
    fn block_name(&self) -> &str {
        "VectorSink"
    }
    fn work(&mut self) -> Result<BlockRet> {
        if !self.src.is_plugged() {
            return Ok(BlockRet::EOF);
        }
        let n = self.src.read_resync(&mut self.buf)?;
        if n == 0 {
            if self.src.state()? == PortState::Eos {
                self.src.unplug();
                return Ok(BlockRet::EOF);
            }
            return Ok(BlockRet::Noop);
        }
        let mut storage = self.storage.borrow_mut();
        let keep = std::cmp::min(n, self.max_size - storage.len());
        storage.extend_from_slice(&self.buf[..keep]);
        Ok(BlockRet::Ok)
    }
}

/*! Blocks, the unit of scheduling.

Blocks each do one thing, and are connected together with streams to
process the data.

Most blocks here are a [`Process`] run by a [`ProcessBlock`], which owns
the upstream read cursor and does the acquire loop: read, recover from
desync, process, and repeat until either an output was produced or the
input ran dry.
*/
use log::debug;

use crate::port::{PortReader, PortState};
use crate::stream::{Streamp, new_streamp};
use crate::{Complex, Result};

/** Return type for all blocks.

This will let the scheduler know if more data could come out of this block,
or if it should just never bother calling it again.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRet {
    /// The normal return. Something was consumed or produced.
    Ok,

    /// Produced nothing, because not enough input.
    Noop,

    /// Block indicates that it will never produce more output.
    ///
    /// Examples:
    /// * A vector source that wrote all its data.
    /// * A processing block whose upstream stream was closed and drained.
    EOF,
}

/// Block trait, that must be implemented for all blocks.
pub trait Block {
    /** Name of block

    Not name of *instance* of block.
     */
    fn block_name(&self) -> &str;

    /// Block work function.
    ///
    /// Must not block. If there's no input, return [`BlockRet::Noop`].
    fn work(&mut self) -> Result<BlockRet>;
}

/// Something that consumes samples and produces them into its own stream.
pub trait Process {
    /// Consume input samples, returning the number of output samples
    /// produced.
    fn process(&mut self, input: &[Complex]) -> Result<usize>;

    /// Stream where the output is produced.
    fn output(&self) -> Streamp;
}

/// One sample in, one sample out.
pub trait Map {
    /// Process one sample.
    fn process_one(&mut self, x: Complex) -> Complex;
}

/// Adapter running a [`Map`] as a [`Process`], into a stream of its own.
pub struct MapProcess<M> {
    map: M,
    out: Streamp,
    scratch: Vec<Complex>,
}

impl<M: Map> MapProcess<M> {
    /// Create new adapter, with an output stream of `capacity` samples.
    pub fn new(map: M, capacity: usize) -> Result<Self> {
        Ok(Self {
            map,
            out: new_streamp(capacity)?,
            scratch: Vec::new(),
        })
    }

    /// Get the wrapped map.
    pub fn inner(&self) -> &M {
        &self.map
    }
}

impl<M: Map> Process for MapProcess<M> {
    fn process(&mut self, input: &[Complex]) -> Result<usize> {
        self.scratch.clear();
        self.scratch
            .extend(input.iter().map(|x| self.map.process_one(*x)));
        self.out.borrow_mut().write(&self.scratch)
    }
    fn output(&self) -> Streamp {
        self.out.clone()
    }
}

/// Block running a [`Process`], reading from an upstream stream.
pub struct ProcessBlock<P> {
    name: String,
    src: PortReader,
    buf: Vec<Complex>,
    process: P,
}

impl<P: Process> ProcessBlock<P> {
    /// Create new block reading from `src`, at most `chunk` samples at a
    /// time.
    ///
    /// Returns the block and its output stream.
    pub fn new<S: Into<String>>(name: S, src: Streamp, process: P, chunk: usize) -> (Self, Streamp) {
        let out = process.output();
        (
            Self {
                name: name.into(),
                src: PortReader::plug(src),
                buf: vec![Complex::default(); std::cmp::max(chunk, 1)],
                process,
            },
            out,
        )
    }

    /// Get the wrapped process.
    pub fn inner(&self) -> &P {
        &self.process
    }

    /// Samples lost to upstream overruns.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.src.lost()
    }
}

impl<P: Process> Block for ProcessBlock<P> {
    fn block_name(&self) -> &str {
        &self.name
    }

    fn work(&mut self) -> Result<BlockRet> {
        if !self.src.is_plugged() {
            return Ok(BlockRet::EOF);
        }
        let mut consumed = 0;
        let mut produced = 0;
        while produced == 0 {
            let n = self.src.read_resync(&mut self.buf)?;
            if n == 0 {
                break;
            }
            consumed += n;
            produced += self.process.process(&self.buf[..n])?;
        }
        if consumed > 0 {
            return Ok(BlockRet::Ok);
        }
        if self.src.state()? == PortState::Eos {
            debug!("{}: upstream closed, closing output", self.name);
            self.process.output().borrow_mut().close();
            self.src.unplug();
            return Ok(BlockRet::EOF);
        }
        Ok(BlockRet::Noop)
    }
}

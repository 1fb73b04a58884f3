/*! Running blocks connected by streams.

Scheduling is cooperative and single threaded. Every pass calls `work()` on
each block that hasn't reached EOF, in the order they were added. The run
ends when every block is at EOF, or when the graph is cancelled.

Adding blocks in upstream to downstream order lets a sample travel the
whole chain in one pass.
*/
use std::fmt::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, info, trace};

use crate::block::{Block, BlockRet};
use crate::{Error, Result};

const DEFAULT_IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Something that runs blocks.
pub trait GraphRunner {
    /// Add a block. Blocks run in the order they were added.
    fn add(&mut self, b: Box<dyn Block>);

    /// Run until all blocks are at EOF, or the graph is cancelled.
    ///
    /// A block error aborts the run, wrapped with the block's name.
    fn run(&mut self) -> Result<()>;

    /// Table of where the time went, once the graph has run.
    fn generate_stats(&self) -> Option<String>;

    /// Token for stopping the graph, for example from another thread.
    fn cancel_token(&self) -> CancellationToken;
}

/// Per block accounting.
#[derive(Debug, Default, Clone)]
struct BlockStats {
    time: Duration,
    calls: u64,
    noops: u64,
    eof: bool,
}

/// What one pass over the blocks amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Busy,
    Idle,
    Done,
}

/**
Graph of blocks, run on the calling thread.

# Example

```
use sigutils::blocks::{BlockConfig, PllParams, VectorSink, VectorSource};
use sigutils::graph::{Graph, GraphRunner};
use sigutils::Complex;
let (src, prev) = VectorSource::new(vec![Complex::new(1.0, 0.0); 100], 64)?;
let (pll, prev) = BlockConfig::Pll(PllParams::default()).build(prev)?;
let sink = VectorSink::new(prev, 1000);
let hook = sink.hook();
let mut g = Graph::new();
g.add(Box::new(src));
g.add(pll);
g.add(Box::new(sink));
g.run()?;
assert_eq!(hook.data().len(), 100);
# Ok::<(), sigutils::Error>(())
```
*/
pub struct Graph {
    blocks: Vec<Box<dyn Block>>,
    stats: Vec<BlockStats>,
    elapsed: Option<Duration>,
    idle_sleep: Duration,
    cancel_token: CancellationToken,
}

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            stats: Vec::new(),
            elapsed: None,
            idle_sleep: DEFAULT_IDLE_SLEEP,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Set how long to sleep after a pass where no block did anything.
    pub fn set_idle_sleep(&mut self, d: Duration) {
        self.idle_sleep = d;
    }

    fn step(&mut self) -> Result<Pass> {
        let mut pass = Pass::Idle;
        for (b, st) in self.blocks.iter_mut().zip(self.stats.iter_mut()) {
            if st.eof {
                continue;
            }
            let start = Instant::now();
            let ret = b.work();
            st.time += start.elapsed();
            st.calls += 1;
            match ret.map_err(|e| Error::wrap(e, format!("in block {}", b.block_name())))? {
                BlockRet::Ok => pass = Pass::Busy,
                BlockRet::Noop => st.noops += 1,
                BlockRet::EOF => {
                    debug!("{} reached EOF", b.block_name());
                    st.eof = true;
                    pass = Pass::Busy;
                }
            }
        }
        if self.stats.iter().all(|s| s.eof) {
            return Ok(Pass::Done);
        }
        Ok(pass)
    }
}

impl GraphRunner for Graph {
    fn add(&mut self, b: Box<dyn Block>) {
        self.blocks.push(b);
        self.stats.push(BlockStats::default());
    }

    fn run(&mut self) -> Result<()> {
        let start = Instant::now();
        let res = loop {
            if self.cancel_token.is_canceled() {
                info!("Graph cancelled");
                break Ok(());
            }
            match self.step() {
                Ok(Pass::Done) => break Ok(()),
                Ok(Pass::Busy) => {}
                Ok(Pass::Idle) => {
                    trace!("Graph idle, sleeping {:?}", self.idle_sleep);
                    std::thread::sleep(self.idle_sleep);
                }
                Err(e) => break Err(e),
            }
        };
        self.elapsed = Some(start.elapsed());
        if let Some(stats) = self.generate_stats() {
            stats.lines().for_each(|l| info!("{l}"));
        }
        res
    }

    fn generate_stats(&self) -> Option<String> {
        let elapsed = self.elapsed?.as_secs_f64();
        let total: f64 = self.stats.iter().map(|s| s.time.as_secs_f64()).sum();
        let w = self
            .blocks
            .iter()
            .map(|b| b.block_name().len())
            .chain(std::iter::once("Outside blocks".len()))
            .max()?;
        let pct = |part: f64| {
            if elapsed > 0.0 {
                100.0 * part / elapsed
            } else {
                0.0
            }
        };
        let rule = "=".repeat(w + 37);

        let mut s = String::new();
        // Writing to a String can't fail.
        let _ = writeln!(s, "{:<w$} {:>10} {:>7} {:>8} {:>8}", "Block", "Seconds", "Share", "Calls", "Idle");
        let _ = writeln!(s, "{rule}");
        for (b, st) in self.blocks.iter().zip(&self.stats) {
            let t = st.time.as_secs_f64();
            let _ = writeln!(
                s,
                "{:<w$} {t:>10.3} {:>6.2}% {:>8} {:>8}",
                b.block_name(),
                pct(t),
                st.calls,
                st.noops
            );
        }
        let _ = writeln!(s, "{rule}");
        let _ = writeln!(s, "{:<w$} {:>10.3} {:>6.2}%", "Outside blocks", elapsed - total, pct(elapsed - total));
        let _ = writeln!(s, "{:<w$} {elapsed:>10.3}", "Elapsed");
        Some(s)
    }

    fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

/** Stops a running [`Graph`] at the start of its next pass.

```
use sigutils::graph::{Graph, GraphRunner};
let g = Graph::new();
let token = g.cancel_token();
std::thread::spawn(move || token.cancel())
    .join()
    .unwrap();
assert!(g.cancel_token().is_canceled());
```
*/
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel. All clones of the token see it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Return true if cancelled.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

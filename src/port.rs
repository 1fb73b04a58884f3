/*! Reading from a stream through a reader owned cursor.

Every consumer of a [`Stream`](crate::stream::Stream) keeps its own absolute
read offset. Many readers can share one stream, each at its own pace, and
each detects by itself that it fell behind.
*/
use log::{trace, warn};

use crate::Complex;
use crate::stream::{StreamError, Streamp};

/// Negative outcomes of a port read.
///
/// Mirrors [`StreamError`], plus a fatal internal error.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowError {
    /// Port is not plugged into a stream.
    #[error("port not plugged into a stream")]
    Uninitialized,

    /// Failed to acquire the upstream buffer.
    #[error("failed to acquire upstream buffer")]
    Acquire,

    /// Reader fell behind. The cursor is invalid and the caller must resync.
    #[error("desync: reader at {pos} but oldest readable sample is {tell}")]
    Desync {
        /// Cursor position.
        pos: u64,
        /// Oldest readable position.
        tell: u64,
    },

    /// Internal error. Something that should never happen, happened.
    #[error("port internal error")]
    Internal,
}

impl From<StreamError> for FlowError {
    fn from(e: StreamError) -> Self {
        match e {
            StreamError::Uninitialized => FlowError::Uninitialized,
            StreamError::Acquire => FlowError::Acquire,
            StreamError::Desync { pos, tell } => FlowError::Desync { pos, tell },
        }
    }
}

/// State of a port, as seen without reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortState {
    /// Data is waiting. The reader is allowed to acquire it.
    Acquire,

    /// Nothing to read yet.
    Wait,

    /// Stream closed, and everything in it has been read.
    Eos,
}

/// A reader cursor into a stream.
#[derive(Debug, Default)]
pub struct PortReader {
    stream: Option<Streamp>,
    pos: u64,
    lost: u64,
}

impl PortReader {
    /// Create a new unplugged port.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a port plugged into a stream, starting at the oldest readable
    /// sample.
    pub fn plug(stream: Streamp) -> Self {
        let pos = stream.borrow().tell();
        Self {
            stream: Some(stream),
            pos,
            lost: 0,
        }
    }

    /// Unplug the port from its stream, dropping the reference to it.
    pub fn unplug(&mut self) {
        self.stream = None;
    }

    /// Return true if the port is plugged into a stream.
    #[must_use]
    pub fn is_plugged(&self) -> bool {
        self.stream.is_some()
    }

    /// Absolute read position.
    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Total samples lost to resyncs.
    #[must_use]
    pub fn lost(&self) -> u64 {
        self.lost
    }

    /// Check if reading is allowed, without reading.
    pub fn state(&self) -> Result<PortState, FlowError> {
        let s = self.stream.as_ref().ok_or(FlowError::Uninitialized)?.borrow();
        let tell = s.tell();
        if self.pos < tell {
            return Err(FlowError::Desync {
                pos: self.pos,
                tell,
            });
        }
        Ok(if self.pos < s.pos() {
            PortState::Acquire
        } else if s.is_closed() {
            PortState::Eos
        } else {
            PortState::Wait
        })
    }

    /// Read into `data`, advancing the cursor by the count read.
    ///
    /// * `Ok(n)`, `n > 0`: data delivered.
    /// * `Ok(0)`: no data (see [`PortReader::state`] to tell end of stream
    ///   from not-yet-available).
    /// * `Err(FlowError::Desync)`: cursor is stale, [`PortReader::resync`].
    pub fn read(&mut self, data: &mut [Complex]) -> Result<usize, FlowError> {
        let s = self.stream.as_ref().ok_or(FlowError::Uninitialized)?;
        let n = s.borrow().read(self.pos, data)?;
        if n > data.len() {
            return Err(FlowError::Internal);
        }
        self.pos += n as u64;
        Ok(n)
    }

    /// Move the cursor to the oldest readable sample of the stream, giving
    /// up on anything older.
    ///
    /// Returns the number of samples lost.
    pub fn resync(&mut self) -> Result<u64, FlowError> {
        let tell = self
            .stream
            .as_ref()
            .ok_or(FlowError::Uninitialized)?
            .borrow()
            .tell();
        let lost = tell.saturating_sub(self.pos);
        self.pos = tell;
        self.lost += lost;
        Ok(lost)
    }

    /// Read, transparently recovering from desync.
    ///
    /// A desync is logged, and the cursor resynced before retrying. Samples
    /// in the gap are lost.
    pub fn read_resync(&mut self, data: &mut [Complex]) -> Result<usize, FlowError> {
        loop {
            match self.read(data) {
                Err(FlowError::Desync { pos, tell }) => {
                    let lost = self.resync()?;
                    warn!("Port: reader too slow at {pos} (oldest {tell}), lost {lost} samples");
                }
                Ok(n) => {
                    trace!("Port: read {n} at {}", self.pos);
                    return Ok(n);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Read, giving up on this call if the cursor went stale.
    ///
    /// On desync the cursor is resynced and zero is returned, so that the
    /// next call reads from the oldest retained sample.
    pub fn read_or_skip(&mut self, data: &mut [Complex]) -> Result<usize, FlowError> {
        match self.read(data) {
            Err(FlowError::Desync { pos, tell }) => {
                let lost = self.resync()?;
                warn!("Port: reader overrun at {pos} (oldest {tell}), lost {lost} samples");
                Ok(0)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::new_streamp;
    use crate::{Float, Result};

    fn ramp(from: usize, to: usize) -> Vec<Complex> {
        (from..to).map(|i| Complex::new(i as Float, 0.0)).collect()
    }

    #[test]
    fn unplugged() -> Result<()> {
        let mut buf = [Complex::default(); 4];
        let s = new_streamp(8)?;
        let mut p = PortReader::plug(s.clone());
        assert!(p.is_plugged());
        p.unplug();
        assert_eq!(std::rc::Rc::strong_count(&s), 1);
        assert!(!p.is_plugged());
        assert_eq!(p.read(&mut buf), Err(FlowError::Uninitialized));
        assert_eq!(p.state(), Err(FlowError::Uninitialized));
        assert_eq!(p.resync(), Err(FlowError::Uninitialized));
        assert!(!PortReader::new().is_plugged());
        Ok(())
    }

    #[test]
    fn independent_readers() -> Result<()> {
        let s = new_streamp(32)?;
        let mut fast = PortReader::plug(s.clone());
        let mut slow = PortReader::plug(s.clone());
        s.borrow_mut().write(&ramp(0, 10))?;

        let mut buf = vec![Complex::default(); 10];
        assert_eq!(fast.read(&mut buf)?, 10);
        assert_eq!(buf, ramp(0, 10));
        assert_eq!(fast.pos(), 10);

        let mut buf = vec![Complex::default(); 4];
        assert_eq!(slow.read(&mut buf)?, 4);
        assert_eq!(buf, ramp(0, 4));
        assert_eq!(slow.read(&mut buf)?, 4);
        assert_eq!(buf, ramp(4, 8));
        assert_eq!(fast.read(&mut buf)?, 0);
        assert_eq!(fast.state()?, PortState::Wait);
        assert_eq!(slow.state()?, PortState::Acquire);
        Ok(())
    }

    #[test]
    fn eos() -> Result<()> {
        let s = new_streamp(8)?;
        let mut p = PortReader::plug(s.clone());
        s.borrow_mut().write(&ramp(0, 2))?;
        s.borrow_mut().close();
        assert_eq!(p.state()?, PortState::Acquire);
        let mut buf = vec![Complex::default(); 4];
        assert_eq!(p.read(&mut buf)?, 2);
        assert_eq!(p.state()?, PortState::Eos);
        assert_eq!(p.read(&mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn desync_recovery() -> Result<()> {
        let s = new_streamp(8)?;
        let mut p = PortReader::plug(s.clone());
        s.borrow_mut().write(&ramp(0, 20))?;
        let mut buf = vec![Complex::default(); 4];
        assert_eq!(
            p.read(&mut buf),
            Err(FlowError::Desync { pos: 0, tell: 12 })
        );
        assert!(matches!(p.state(), Err(FlowError::Desync { .. })));
        assert_eq!(p.resync()?, 12);
        assert_eq!(p.lost(), 12);

        // Proceeds monotonically from the resync point.
        let mut got = Vec::new();
        loop {
            let n = p.read(&mut buf)?;
            if n == 0 {
                break;
            }
            got.extend_from_slice(&buf[..n]);
        }
        s.borrow_mut().write(&ramp(20, 23))?;
        let n = p.read(&mut buf)?;
        got.extend_from_slice(&buf[..n]);
        assert_eq!(got, ramp(12, 23));
        Ok(())
    }

    #[test]
    fn read_resync() -> Result<()> {
        let s = new_streamp(8)?;
        let mut p = PortReader::plug(s.clone());
        s.borrow_mut().write(&ramp(0, 11))?;
        let mut buf = vec![Complex::default(); 8];
        assert_eq!(p.read_resync(&mut buf)?, 8);
        assert_eq!(buf, ramp(3, 11));
        assert_eq!(p.lost(), 3);
        Ok(())
    }

    #[test]
    fn read_or_skip() -> Result<()> {
        let s = new_streamp(8)?;
        let mut p = PortReader::plug(s.clone());
        s.borrow_mut().write(&ramp(0, 11))?;
        let mut buf = vec![Complex::default(); 8];
        assert_eq!(p.read_or_skip(&mut buf)?, 0);
        assert_eq!(p.pos(), 3);
        assert_eq!(p.read_or_skip(&mut buf)?, 8);
        assert_eq!(buf, ramp(3, 11));
        Ok(())
    }
}

/*! Streams connecting blocks.

A stream is a fixed capacity ring buffer of complex samples, with a
monotonically increasing write position. It has exactly one writer, and any
number of readers. Readers keep their own absolute read offset (see
[`crate::port::PortReader`]) and call [`Stream::read`], which is positional
and repeatable.

Writing never blocks. If there's no room, the oldest samples are
overwritten, and readers still pointing at them will get
[`StreamError::Desync`] on their next read. Overwritten samples that no
reader had read yet are counted in [`Stream::overwritten`].

```text
 absolute position:   tell()                         pos()
                        |<-------- available() -------->|
 ring buffer:  [ ... newest | oldest ... ... ... ... ... ]
                           ^ptr
```
*/
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::warn;

use crate::{Complex, Error, Result};

/// Negative outcomes of a stream read.
///
/// A successful read is `Ok(n)`, where `n == 0` means there is no data yet
/// (or, on a closed stream, never will be).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    /// The stream (or the port in front of it) is not initialized.
    #[error("stream not initialized")]
    Uninitialized,

    /// Failed to acquire the stream buffer.
    #[error("failed to acquire stream buffer")]
    Acquire,

    /// Reader position is older than the oldest retained sample.
    #[error("desync: reader at {pos} but oldest readable sample is {tell}")]
    Desync {
        /// Position the reader tried to read from.
        pos: u64,
        /// Oldest readable position at the time.
        tell: u64,
    },
}

/// A ring buffer of complex samples.
#[derive(Debug)]
pub struct Stream {
    buffer: Vec<Complex>,
    ptr: usize,
    avail: usize,
    pos: u64,
    closed: bool,
    // Furthest position any reader has read up to.
    read_mark: Cell<u64>,
    overwritten: u64,
}

/// Convenience type for a "pointer to a stream".
///
/// The core is single threaded, so the handle is not `Send`.
pub type Streamp = Rc<RefCell<Stream>>;

/// Create a new Streamp.
pub fn new_streamp(capacity: usize) -> Result<Streamp> {
    Ok(Rc::new(RefCell::new(Stream::new(capacity)?)))
}

/// Create a new Streamp with contents.
pub fn streamp_from_slice(capacity: usize, data: &[Complex]) -> Result<Streamp> {
    let s = new_streamp(capacity)?;
    s.borrow_mut().write(data)?;
    Ok(s)
}

impl Stream {
    /// Create a new stream.
    ///
    /// Fails if capacity is zero.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::invalid("stream capacity must be non-zero"));
        }
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|e| Error::invalid(format!("can't allocate stream of {capacity}: {e}")))?;
        buffer.resize(capacity, Complex::default());
        Ok(Self {
            buffer,
            ptr: 0,
            avail: 0,
            pos: 0,
            closed: false,
            read_mark: Cell::new(0),
            overwritten: 0,
        })
    }

    /// Total number of samples the stream can retain.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Number of samples currently retained.
    #[must_use]
    pub fn available(&self) -> usize {
        self.avail
    }

    /// Absolute write position. IOW total number of samples ever written.
    #[must_use]
    pub fn pos(&self) -> u64 {
        self.pos
    }

    /// Oldest still readable absolute position.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.pos - self.avail as u64
    }

    /// Total number of samples overwritten before any reader read them.
    #[must_use]
    pub fn overwritten(&self) -> u64 {
        self.overwritten
    }

    /// Mark end of stream. Readers that have read everything will then know
    /// that no more data is coming.
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Return true if the writer has closed the stream.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Append samples, overwriting the oldest data if there's not enough
    /// room.
    ///
    /// If `data` is larger than the whole stream, only the last
    /// `capacity()` samples are kept, but the write position still advances
    /// by `data.len()`.
    ///
    /// Returns the number of samples written. Unread samples pushed out
    /// are added to [`Stream::overwritten`], with a warning.
    pub fn write(&mut self, data: &[Complex]) -> Result<usize> {
        let cap = self.capacity();
        let tell = self.tell();
        let mut data = if data.len() > cap {
            let skip = data.len() - cap;
            self.pos += skip as u64;
            self.ptr = (self.ptr + skip) % cap;
            &data[skip..]
        } else {
            data
        };
        let n = data.len();
        while !data.is_empty() {
            let chunk = self.get_contiguous(data.len());
            let len = chunk.len();
            chunk.copy_from_slice(&data[..len]);
            self.commit(len)?;
            data = &data[len..];
        }
        self.note_overwrite(tell);
        Ok(n)
    }

    /// Return a writable slice into the live buffer, for producing in place
    /// without copying.
    ///
    /// The slice is at most `max` long, and stops at the physical end of
    /// the ring. Commit with [`Stream::advance_contiguous`].
    pub fn get_contiguous(&mut self, max: usize) -> &mut [Complex] {
        let n = std::cmp::min(max, self.capacity() - self.ptr);
        &mut self.buffer[self.ptr..self.ptr + n]
    }

    /// Commit `n` samples previously produced into the slice from
    /// [`Stream::get_contiguous`].
    ///
    /// Committing past the physical end of the ring is an internal error.
    pub fn advance_contiguous(&mut self, n: usize) -> Result<()> {
        let tell = self.tell();
        self.commit(n)?;
        self.note_overwrite(tell);
        Ok(())
    }

    fn commit(&mut self, n: usize) -> Result<()> {
        let cap = self.capacity();
        if n > cap - self.ptr {
            return Err(Error::Internal(format!(
                "stream advance of {n} past end of ring (ptr {}, capacity {cap})",
                self.ptr
            )));
        }
        self.ptr = (self.ptr + n) % cap;
        self.avail = std::cmp::min(self.avail + n, cap);
        self.pos += n as u64;
        Ok(())
    }

    // Count samples evicted since `old_tell` that were past the read mark.
    fn note_overwrite(&mut self, old_tell: u64) {
        let from = old_tell.max(self.read_mark.get());
        let n = self.tell().saturating_sub(from);
        if n > 0 {
            self.overwritten += n;
            warn!(
                "Stream: overwrote {n} unread samples ({} total), readers are too slow",
                self.overwritten
            );
        }
    }

    /// Copy samples starting at absolute position `offset` into `data`.
    ///
    /// Returns:
    /// * `Ok(n)`, `n > 0`: copied `n` samples.
    /// * `Ok(0)`: no data at `offset` yet.
    /// * `Err(StreamError::Desync)`: `offset` has already been overwritten.
    pub fn read(&self, offset: u64, data: &mut [Complex]) -> std::result::Result<usize, StreamError> {
        let tell = self.tell();
        if offset < tell {
            return Err(StreamError::Desync { pos: offset, tell });
        }
        if offset >= self.pos {
            return Ok(0);
        }
        let cap = self.capacity();
        let behind = (self.pos - offset) as usize;
        let n = std::cmp::min(data.len(), behind);
        let start = (self.ptr + cap - behind) % cap;

        // At most two copies: up to the physical end, and from the start.
        let first = std::cmp::min(n, cap - start);
        data[..first].copy_from_slice(&self.buffer[start..start + first]);
        if first < n {
            data[first..n].copy_from_slice(&self.buffer[..n - first]);
        }
        let end = offset + n as u64;
        if end > self.read_mark.get() {
            self.read_mark.set(end);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Float;

    fn ramp(from: usize, to: usize) -> Vec<Complex> {
        (from..to)
            .map(|i| Complex::new(i as Float, -(i as Float)))
            .collect()
    }

    #[test]
    fn reject_zero_capacity() {
        assert!(Stream::new(0).is_err());
    }

    #[test]
    fn empty() -> Result<()> {
        let s = Stream::new(10)?;
        let mut buf = [Complex::default(); 4];
        assert_eq!(s.read(0, &mut buf)?, 0);
        assert_eq!(s.tell(), 0);
        assert_eq!(s.pos(), 0);
        Ok(())
    }

    #[test]
    fn round_trip() -> Result<()> {
        let mut s = Stream::new(16)?;
        let data = ramp(0, 10);
        assert_eq!(s.write(&data)?, 10);
        let mut buf = vec![Complex::default(); 10];
        assert_eq!(s.read(0, &mut buf)?, 10);
        assert_eq!(buf, data);

        // Repeatable.
        let mut buf2 = vec![Complex::default(); 10];
        assert_eq!(s.read(0, &mut buf2)?, 10);
        assert_eq!(buf2, data);

        // Past the end.
        assert_eq!(s.read(10, &mut buf)?, 0);
        Ok(())
    }

    #[test]
    fn round_trip_wrapped() -> Result<()> {
        let mut s = Stream::new(16)?;
        s.write(&ramp(0, 12))?;

        // This write wraps the ring.
        let data = ramp(12, 22);
        s.write(&data)?;
        assert_eq!(s.tell(), 6);
        assert_eq!(s.pos(), 22);

        let mut buf = vec![Complex::default(); 10];
        assert_eq!(s.read(12, &mut buf)?, 10);
        assert_eq!(buf, data);

        let mut buf = vec![Complex::default(); 16];
        assert_eq!(s.read(6, &mut buf)?, 16);
        assert_eq!(buf, ramp(6, 22));
        Ok(())
    }

    #[test]
    fn partial_read() -> Result<()> {
        let mut s = Stream::new(8)?;
        s.write(&ramp(0, 5))?;
        let mut buf = vec![Complex::default(); 3];
        assert_eq!(s.read(1, &mut buf)?, 3);
        assert_eq!(buf, ramp(1, 4));
        let mut buf = vec![Complex::default(); 10];
        assert_eq!(s.read(3, &mut buf)?, 2);
        assert_eq!(&buf[..2], &ramp(3, 5));
        Ok(())
    }

    #[test]
    fn overflow() -> Result<()> {
        let cap = 16;
        let k = 5;
        let mut s = Stream::new(cap)?;
        let data = ramp(0, cap + k);
        s.write(&data)?;
        let mut buf = vec![Complex::default(); cap];
        assert_eq!(
            s.read(0, &mut buf),
            Err(StreamError::Desync {
                pos: 0,
                tell: k as u64
            })
        );
        assert_eq!(s.read(k as u64, &mut buf)?, cap);
        assert_eq!(buf, &data[k..]);
        Ok(())
    }

    #[test]
    fn overflow_in_pieces() -> Result<()> {
        let mut s = Stream::new(8)?;
        for i in 0..5 {
            s.write(&ramp(i * 3, i * 3 + 3))?;
        }
        assert_eq!(s.pos(), 15);
        assert_eq!(s.tell(), 7);
        let mut buf = vec![Complex::default(); 8];
        assert!(matches!(
            s.read(6, &mut buf),
            Err(StreamError::Desync { .. })
        ));
        assert_eq!(s.read(7, &mut buf)?, 8);
        assert_eq!(buf, ramp(7, 15));
        Ok(())
    }

    #[test]
    fn overwritten_unread() -> Result<()> {
        let mut s = Stream::new(8)?;
        s.write(&ramp(0, 6))?;
        let mut buf = vec![Complex::default(); 2];
        assert_eq!(s.read(0, &mut buf)?, 2);

        // Pushes out 0..3, and only 2 was never read.
        s.write(&ramp(6, 11))?;
        assert_eq!(s.tell(), 3);
        assert_eq!(s.overwritten(), 1);

        // Oversized: 3..16 are gone without being read.
        s.write(&ramp(11, 24))?;
        assert_eq!(s.tell(), 16);
        assert_eq!(s.overwritten(), 14);

        // A reader that keeps up loses nothing.
        let mut buf = vec![Complex::default(); 8];
        assert_eq!(s.read(16, &mut buf)?, 8);
        s.write(&ramp(24, 32))?;
        assert_eq!(s.overwritten(), 14);

        // Neither does writing in place.
        assert_eq!(s.read(24, &mut buf)?, 8);
        let n = s.get_contiguous(3).len();
        s.advance_contiguous(n)?;
        assert_eq!(s.overwritten(), 14);
        Ok(())
    }

    #[test]
    fn contiguous() -> Result<()> {
        let mut s = Stream::new(8)?;
        s.write(&ramp(0, 6))?;
        {
            let w = s.get_contiguous(100);
            assert_eq!(w.len(), 2);
            w.copy_from_slice(&ramp(6, 8));
        }
        s.advance_contiguous(2)?;
        assert_eq!(s.get_contiguous(100).len(), 8);
        assert!(s.advance_contiguous(9).is_err());

        let mut buf = vec![Complex::default(); 8];
        assert_eq!(s.read(0, &mut buf)?, 8);
        assert_eq!(buf, ramp(0, 8));
        Ok(())
    }

    #[test]
    fn close() -> Result<()> {
        let s = streamp_from_slice(4, &ramp(0, 2))?;
        assert!(!s.borrow().is_closed());
        s.borrow_mut().close();
        assert!(s.borrow().is_closed());
        Ok(())
    }
}

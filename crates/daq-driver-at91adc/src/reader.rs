//! Consumer read path over the passive buffer.
//!
//! A read returns at most the bytes left between the cursor and the end of
//! the passive buffer; it never spans a swap. The copy into the caller's
//! buffer happens outside the pool lock. If a completion swapped the
//! buffers while the copy was in flight, the copied bytes are discarded
//! and the read starts over on the freshly completed buffer.

use std::io;

use tracing::trace;

use crate::At91Adc;
use crate::device::Shared;
use crate::error::{AdcError, Result};

/// How a read behaves when no data is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Wait for the next completed buffer
    #[default]
    Blocking,
    /// Fail with [`AdcError::WouldBlock`]
    NonBlocking,
}

impl Shared {
    pub(crate) fn read(&self, dest: &mut [u8], count: usize, mode: ReadMode) -> Result<usize> {
        if count == 0 {
            return Ok(0);
        }

        loop {
            let ticket = self.readers.ticket();
            let state = self.state.lock();
            if !state.open {
                return Err(AdcError::NotOpen);
            }

            let view = self.pool.snapshot();
            if view.remaining() == 0 {
                drop(state);
                if mode == ReadMode::NonBlocking {
                    return Err(AdcError::WouldBlock);
                }
                self.readers.wait(ticket)?;
                continue;
            }

            let n = count.min(view.remaining());
            if n > dest.len() {
                return Err(AdcError::Fault {
                    requested: n,
                    capacity: dest.len(),
                });
            }

            {
                let bytes = view.buffer.read();
                dest[..n].copy_from_slice(&bytes[view.cursor..view.cursor + n]);
            }

            if self.pool.advance(&view, n) {
                trace!(n, cursor = view.cursor + n, size = view.size, "Read samples");
                return Ok(n);
            }
            trace!(generation = view.generation, "Buffer swapped during copy, retrying");
        }
    }

    pub(crate) fn poll(&self) -> bool {
        let state = self.state.lock();
        state.open && self.pool.has_data()
    }
}

/// [`io::Read`] adapter over [`At91Adc::read`].
///
/// A blocking reader returns only once data is available;
/// [`io::ErrorKind::WouldBlock`] and [`io::ErrorKind::Interrupted`] surface
/// the corresponding device errors.
#[derive(Debug)]
pub struct StreamReader<'a> {
    device: &'a At91Adc,
    mode: ReadMode,
}

impl<'a> StreamReader<'a> {
    pub(crate) fn new(device: &'a At91Adc, mode: ReadMode) -> Self {
        Self { device, mode }
    }
}

impl io::Read for StreamReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.device.read(buf, buf.len(), self.mode)?)
    }
}

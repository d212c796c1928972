//! Blocking byte-stream access to the card through a single cached block

use core::cmp;

use embedded_hal::digital::v2::InputPin;
use embedded_io::blocking::{Read, Seek, Write};
use embedded_io::{Io, SeekFrom};

use crate::card::{BLOCK_LEN, Block};
use crate::errors::SdError;
use crate::host::{Duration, SdHost};
use crate::sd::SdCard;

/// Timeout for one blocking block transfer, in milliseconds
pub const STREAM_TRANSFER_TIMEOUT_MS: u32 = 1_000;

/// Byte-granular reader/writer over an [`SdCard`].
///
/// Keeps one working block cached and moves it through the adapter's
/// transfer path as the position crosses block boundaries. Reads and writes
/// stop at the boundary of the working block, so a single call can return
/// short; `read_exact` and `write_all` cover the looping.
///
/// Dropping the stream discards unwritten changes. Call `flush` first.
pub struct SdStream<'a, H: SdHost, CD: InputPin> {
    sd: &'a mut SdCard<H, CD>,
    /// Working block, absent only while armed with the adapter.
    working_block: Option<&'static mut [Block]>,
    /// Block address the working block mirrors.
    working_block_addr: u32,
    working_block_valid: bool,
    /// The working block holds changes the card does not have yet.
    modified: bool,
    position: u64,
    /// Card size in blocks, captured at stream creation.
    block_count: u32,
}

impl<'a, H: SdHost, CD: InputPin> SdStream<'a, H, CD> {
    /// Wrap `sd` with `working_block` as the one-block cache. The adapter
    /// must already be initialized, since the card geometry is captured
    /// here.
    pub fn new(
        sd: &'a mut SdCard<H, CD>,
        working_block: &'static mut [Block],
    ) -> Result<Self, SdError> {
        if working_block.len() != 1 {
            return Err(SdError::BufferLength {});
        }

        let block_count = sd.sector_count()?;

        Ok(Self {
            sd,
            working_block: Some(working_block),
            working_block_addr: 0,
            working_block_valid: false,
            modified: false,
            position: 0,
            block_count,
        })
    }

    /// Total capacity of the card, in bytes.
    pub fn capacity(&self) -> u64 {
        u64::from(self.block_count) * BLOCK_LEN as u64
    }

    /// Current position, in bytes from the start of the card.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get the working block back if an earlier transfer timed out with the
    /// buffer still armed.
    fn reclaim_working_block(&mut self) -> Result<(), SdError> {
        if self.working_block.is_none() {
            // A late completion lands through the dispatch; pump it once so
            // polling-mode callers can recover with no vectors wired.
            self.sd.on_dma_irq();
            self.sd.on_bus_irq();
            self.working_block = self.sd.take_buffer();
        }

        match self.working_block.is_some() {
            true => Ok(()),
            false => Err(SdError::TransferInFlight {}),
        }
    }

    /// Write the working block back if it holds unwritten changes.
    fn write_back(&mut self) -> Result<(), SdError> {
        if !self.modified {
            return Ok(());
        }

        self.reclaim_working_block()?;

        // Checked by reclaim above
        let block = self.working_block.take().unwrap();

        let token = match self.sd.write_blocks(block, self.working_block_addr) {
            Ok(token) => token,
            Err((e, block)) => {
                self.working_block = Some(block);
                return Err(e);
            }
        };

        if let Err(e) = self
            .sd
            .wait_transfer(token, Duration::millis(STREAM_TRANSFER_TIMEOUT_MS))
        {
            self.working_block = self.sd.take_buffer();
            return Err(e);
        }

        self.working_block = self.sd.take_buffer();
        self.modified = false;

        Ok(())
    }

    /// Make the working block mirror `block_addr`, writing changes back
    /// first.
    fn load_working_block(&mut self, block_addr: u32) -> Result<(), SdError> {
        if self.working_block_valid && self.working_block_addr == block_addr {
            // A timed-out write-back leaves the cached block armed with the
            // adapter; it has to be back in hand before its bytes are used.
            return self.reclaim_working_block();
        }

        self.write_back()?;
        self.reclaim_working_block()?;

        self.working_block_valid = false;

        // Checked by reclaim above
        let block = self.working_block.take().unwrap();

        let token = match self.sd.read_blocks(block, block_addr) {
            Ok(token) => token,
            Err((e, block)) => {
                self.working_block = Some(block);
                return Err(e);
            }
        };

        if let Err(e) = self
            .sd
            .wait_transfer(token, Duration::millis(STREAM_TRANSFER_TIMEOUT_MS))
        {
            self.working_block = self.sd.take_buffer();
            return Err(e);
        }

        self.working_block = self.sd.take_buffer();
        self.working_block_addr = block_addr;
        self.working_block_valid = true;

        Ok(())
    }

    /// Point the working block at `block_addr` without reading the old
    /// contents. Only sound right before the whole block is overwritten.
    fn claim_working_block(&mut self, block_addr: u32) -> Result<(), SdError> {
        if self.working_block_valid && self.working_block_addr == block_addr {
            // Same armed-cache case as in load_working_block
            return self.reclaim_working_block();
        }

        self.write_back()?;
        self.reclaim_working_block()?;

        self.working_block_addr = block_addr;
        self.working_block_valid = true;

        Ok(())
    }
}

impl<'a, H: SdHost, CD: InputPin> Io for SdStream<'a, H, CD> {
    type Error = SdError;
}

impl<'a, H: SdHost, CD: InputPin> Read for SdStream<'a, H, CD> {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize, SdError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let capacity = self.capacity();

        // The end of the card reads as a clean end of stream
        if self.position >= capacity {
            return Ok(0);
        }

        let block_addr = (self.position / (BLOCK_LEN as u64)) as u32;
        self.load_working_block(block_addr)?;

        let offset = (self.position % (BLOCK_LEN as u64)) as usize;
        let mut len = cmp::min(buffer.len(), BLOCK_LEN - offset);

        let remaining = capacity - self.position;
        if (len as u64) > remaining {
            len = remaining as usize;
        }

        // Put back by the load above
        let block = &self.working_block.as_ref().unwrap()[0];
        buffer[..len].copy_from_slice(&block.bytes[offset..offset + len]);

        self.position += len as u64;

        Ok(len)
    }
}

impl<'a, H: SdHost, CD: InputPin> Write for SdStream<'a, H, CD> {
    fn write(&mut self, buffer: &[u8]) -> Result<usize, SdError> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let capacity = self.capacity();

        if self.position >= capacity {
            return Err(SdError::OutOfRange {});
        }

        let block_addr = (self.position / (BLOCK_LEN as u64)) as u32;
        let offset = (self.position % (BLOCK_LEN as u64)) as usize;
        let len = cmp::min(buffer.len(), BLOCK_LEN - offset);

        // A whole-block overwrite never needs the old contents read in
        if len == BLOCK_LEN {
            self.claim_working_block(block_addr)?;
        } else {
            self.load_working_block(block_addr)?;
        }

        // Put back by the claim or load above
        let block = &mut self.working_block.as_mut().unwrap()[0];
        block.bytes[offset..offset + len].copy_from_slice(&buffer[..len]);
        self.modified = true;

        self.position += len as u64;

        Ok(len)
    }

    fn flush(&mut self) -> Result<(), SdError> {
        self.write_back()
    }
}

impl<'a, H: SdHost, CD: InputPin> Seek for SdStream<'a, H, CD> {
    fn seek(&mut self, position: SeekFrom) -> Result<u64, SdError> {
        let target = match position {
            SeekFrom::Start(position) => Some(position),
            SeekFrom::End(delta) => offset_position(self.capacity(), delta),
            SeekFrom::Current(delta) => offset_position(self.position, delta),
        };

        match target {
            Some(position) => {
                self.position = position;
                Ok(position)
            }
            None => Err(SdError::OutOfRange {}),
        }
    }
}

/// Apply a signed seek delta to a base position, if the result stays
/// representable.
fn offset_position(base: u64, delta: i64) -> Option<u64> {
    match delta >= 0 {
        true => base.checked_add(delta as u64),
        false => base.checked_sub(delta.unsigned_abs()),
    }
}

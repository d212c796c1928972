//! The SD block-device adapter: bring-up, status, DMA block transfers and
//! interrupt dispatch over a vendor host controller

use core::cell::RefCell;
use core::sync::atomic::{AtomicU32, Ordering};

use critical_section::Mutex;
use embedded_hal::digital::v2::InputPin;

use crate::card::{Block, CardInfo, CardKind, CardVersion, TransferState};
use crate::config::BusConfig;
use crate::errors::SdError;
use crate::host::{Duration, SdHost};

/// Direction of a block transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferDir {
    Read,
    Write,
}

/// Identifies one armed transfer for completion polling.
///
/// Every arm hands out a fresh token, so a completion left over from an
/// earlier transfer can never satisfy a later transfer's poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferToken {
    dir: TransferDir,
    seq: u32,
}

impl TransferToken {
    #[inline]
    pub fn direction(&self) -> TransferDir {
        self.dir
    }
}

/// Completion bookkeeping for one transfer direction.
///
/// `armed` is written by the foreground when a transfer is armed and read by
/// the interrupt path; `done` is written by the interrupt path and read by
/// the foreground. One writer per counter, so no locking is needed.
struct DirFlags {
    armed: AtomicU32,
    done: AtomicU32,
}

impl DirFlags {
    const fn new() -> Self {
        Self {
            armed: AtomicU32::new(0),
            done: AtomicU32::new(0),
        }
    }
}

/// Has `done` caught up to `seq`, allowing for counter wrap.
#[inline]
fn seq_reached(done: u32, seq: u32) -> bool {
    done.wrapping_sub(seq) < u32::MAX / 2
}

/// A buffer the adapter is holding while its transfer runs.
struct ActiveTransfer {
    buf: &'static mut [Block],
    token: TransferToken,
}

/// SD block-device adapter over a vendor host controller.
///
/// Owns the host driver, the card-detect pin and all transfer state; nothing
/// in this crate lives in a process-wide singleton. To share one adapter
/// between foreground code and the two interrupt vectors, put it in a
/// [`SharedSd`] cell.
pub struct SdCard<H: SdHost, CD: InputPin> {
    host: H,
    detect: CD,
    cfg: BusConfig,
    /// One-shot init latch, set only after a fully successful init.
    initialized: bool,
    /// Sequence counter behind the issued tokens.
    seq: u32,
    read_flags: DirFlags,
    write_flags: DirFlags,
    /// Buffer held for the armed transfer.
    active: Option<ActiveTransfer>,
}

impl<H: SdHost, CD: InputPin> SdCard<H, CD> {
    /// Create an adapter over `host` with the card-detect input `detect`.
    /// Nothing touches hardware until [`SdCard::init`].
    pub fn new(host: H, detect: CD, cfg: BusConfig) -> Self {
        Self {
            host,
            detect,
            cfg,
            initialized: false,
            seq: 0,
            read_flags: DirFlags::new(),
            write_flags: DirFlags::new(),
            active: None,
        }
    }

    /// Bring up the bus and identify the card.
    ///
    /// Runs the one-time peripheral setup, resets and initializes the
    /// controller, checks that the card answers a metadata query, then
    /// switches to the configured bus width. Idempotent: once a call has
    /// succeeded, later calls return without touching hardware. A failed
    /// call does not latch, so init can be retried.
    pub fn init(&mut self) -> Result<(), SdError> {
        if self.initialized {
            return Ok(());
        }

        self.host.setup(&self.cfg);
        self.host.reset();

        if let Err(e) = self.host.init_card(&self.cfg) {
            #[cfg(feature = "defmt")]
            defmt::warn!("sd init failed, host status {=i32}", e.0);
            return Err(SdError::InitFailed { code: e.0 });
        }

        // The card has to answer a metadata query before the adapter
        // reports itself up.
        if let Err(e) = self.host.card_info() {
            return Err(SdError::CardInfoFailed { code: e.0 });
        }

        // A refused width switch leaves the bus at one bit, which still
        // works, so the result does not fail the init.
        let _ = self.host.set_bus_width(self.cfg.bus_width);

        self.initialized = true;

        Ok(())
    }

    /// Coarse card status.
    ///
    /// `Busy` covers every state that is neither settled in transfer nor
    /// faulted, including an adapter that has not completed [`SdCard::init`]
    /// yet.
    pub fn status(&mut self) -> TransferState {
        if !self.initialized {
            return TransferState::Busy;
        }

        TransferState::from(self.host.card_state())
    }

    /// Poll [`SdCard::status`] until it reads `Ok`, bounded by `timeout`
    /// against the host clock.
    ///
    /// A card that stays busy for the whole window times out; a card that
    /// faults fails as soon as the fault is seen. A zero timeout always
    /// fails.
    pub fn wait_ready(&mut self, timeout: Duration) -> Result<(), SdError> {
        let start_time = self.host.now();

        loop {
            let current_time = self.host.now();

            match current_time.checked_duration_since(start_time) {
                Some(elapsed) if elapsed < timeout => {}
                _ => {
                    return Err(SdError::StatusTimeout {
                        timeout_ms: timeout.to_millis(),
                    });
                }
            }

            match self.status() {
                TransferState::Ok => return Ok(()),
                TransferState::Error => return Err(SdError::CardFault {}),
                TransferState::Busy => {}
            }
        }
    }

    /// True when a card sits in the slot. The detect switch is active-low,
    /// so a high (or unreadable) pin means no card.
    pub fn card_present(&self) -> bool {
        matches!(self.detect.is_low(), Ok(true))
    }

    /// Query the card's metadata. Fetched from the host on every call, never
    /// cached.
    pub fn card_info(&mut self) -> Result<CardInfo, SdError> {
        if !self.initialized {
            return Err(SdError::NotInitialized {});
        }

        match self.host.card_info() {
            Ok(info) => Ok(info),
            Err(e) => Err(SdError::CardInfoFailed { code: e.0 }),
        }
    }

    /// Number of 512-byte sectors the card reports.
    pub fn sector_count(&mut self) -> Result<u32, SdError> {
        Ok(self.card_info()?.logical_block_count)
    }

    /// Sector size in bytes, as the card reports it.
    pub fn sector_size(&mut self) -> Result<u32, SdError> {
        Ok(self.card_info()?.logical_block_size)
    }

    /// Transfer block size in bytes. The card reports its logical block
    /// size here; the physical geometry is available via
    /// [`SdCard::card_info`].
    pub fn block_size(&mut self) -> Result<u32, SdError> {
        Ok(self.card_info()?.logical_block_size)
    }

    /// Capacity class of the card.
    pub fn card_kind(&mut self) -> Result<CardKind, SdError> {
        Ok(self.card_info()?.kind)
    }

    /// Specification generation of the card.
    pub fn card_version(&mut self) -> Result<CardVersion, SdError> {
        Ok(self.card_info()?.version)
    }

    /// Card command class bits.
    pub fn card_class(&mut self) -> Result<u16, SdError> {
        Ok(self.card_info()?.class)
    }

    /// Arm a DMA read of `buf.len()` blocks starting at block `block_addr`.
    ///
    /// Returns as soon as the host accepts the transfer. The data is valid
    /// only once the returned token reports complete and the buffer has been
    /// reclaimed with [`SdCard::take_buffer`]. A rejected arm hands the
    /// buffer straight back inside the error, never to the adapter.
    pub fn read_blocks(
        &mut self,
        buf: &'static mut [Block],
        block_addr: u32,
    ) -> Result<TransferToken, (SdError, &'static mut [Block])> {
        self.arm(buf, block_addr, TransferDir::Read)
    }

    /// Arm a DMA write of `buf.len()` blocks starting at block `block_addr`.
    /// Same acceptance, completion and reclaim rules as
    /// [`SdCard::read_blocks`].
    pub fn write_blocks(
        &mut self,
        buf: &'static mut [Block],
        block_addr: u32,
    ) -> Result<TransferToken, (SdError, &'static mut [Block])> {
        self.arm(buf, block_addr, TransferDir::Write)
    }

    fn arm(
        &mut self,
        buf: &'static mut [Block],
        block_addr: u32,
        dir: TransferDir,
    ) -> Result<TransferToken, (SdError, &'static mut [Block])> {
        if !self.initialized {
            return Err((SdError::NotInitialized {}, buf));
        }

        if self.active.is_some() {
            return Err((SdError::TransferInFlight {}, buf));
        }

        if buf.is_empty() {
            return Err((SdError::BufferLength {}, buf));
        }

        let blocks = buf.len() as u32;
        let seq = self.seq.wrapping_add(1);

        // Publish the armed sequence before the host can raise the
        // completion interrupt.
        self.flags(dir).armed.store(seq, Ordering::Release);

        let result = {
            let words = bytemuck::cast_slice_mut::<Block, u32>(buf);
            match dir {
                TransferDir::Read => self.host.arm_read(words, block_addr, blocks),
                TransferDir::Write => self.host.arm_write(words, block_addr, blocks),
            }
        };

        if let Err(e) = result {
            let error = match dir {
                TransferDir::Read => SdError::ReadFailed { code: e.0 },
                TransferDir::Write => SdError::WriteFailed { code: e.0 },
            };
            return Err((error, buf));
        }

        self.seq = seq;
        let token = TransferToken { dir, seq };
        self.active = Some(ActiveTransfer { buf, token });

        Ok(token)
    }

    /// True once the transfer identified by `token` has completed. Reads the
    /// completion flags only; the interrupt dispatch (or a
    /// [`SdCard::wait_transfer`] pump) is what advances them.
    #[inline]
    pub fn transfer_complete(&self, token: TransferToken) -> bool {
        let done = self.flags(token.dir).done.load(Ordering::Acquire);

        seq_reached(done, token.seq)
    }

    /// True while a buffer is armed and not yet reclaimable.
    #[inline]
    pub fn transfer_in_flight(&self) -> bool {
        match &self.active {
            Some(active) => !self.transfer_complete(active.token),
            None => false,
        }
    }

    /// Hand back the buffer from the last arm.
    ///
    /// Returns it once the transfer has completed; `None` while the
    /// transfer is still running or when nothing is armed.
    pub fn take_buffer(&mut self) -> Option<&'static mut [Block]> {
        let done = match &self.active {
            Some(active) => self.transfer_complete(active.token),
            None => return None,
        };

        if !done {
            return None;
        }

        self.active.take().map(|active| active.buf)
    }

    /// Busy-wait until `token` completes, bounded by `timeout`.
    ///
    /// Pumps both dispatch entries each pass so it also works with the
    /// vectors unwired (polling mode); with live vectors the extra service
    /// calls are covered by the host contract.
    pub fn wait_transfer(
        &mut self,
        token: TransferToken,
        timeout: Duration,
    ) -> Result<(), SdError> {
        let start_time = self.host.now();

        loop {
            if self.transfer_complete(token) {
                return Ok(());
            }

            self.on_dma_irq();
            self.on_bus_irq();

            let current_time = self.host.now();

            match current_time.checked_duration_since(start_time) {
                Some(elapsed) if elapsed < timeout => {}
                _ => {
                    return Err(SdError::TransferTimeout {
                        timeout_ms: timeout.to_millis(),
                    });
                }
            }
        }
    }

    /// Bus controller interrupt entry. Call from the bus vector; safe to
    /// call from a polling loop as well.
    pub fn on_bus_irq(&mut self) {
        let events = self.host.service_irq();

        if events.read_done {
            let armed = self.read_flags.armed.load(Ordering::Acquire);
            self.read_flags.done.store(armed, Ordering::Release);
        }

        if events.write_done {
            let armed = self.write_flags.armed.load(Ordering::Acquire);
            self.write_flags.done.store(armed, Ordering::Release);
        }
    }

    /// DMA stream interrupt entry. Call from the stream's vector.
    pub fn on_dma_irq(&mut self) {
        self.host.service_dma_irq();
    }

    #[inline]
    fn flags(&self, dir: TransferDir) -> &DirFlags {
        match dir {
            TransferDir::Read => &self.read_flags,
            TransferDir::Write => &self.write_flags,
        }
    }

    #[cfg(test)]
    pub(crate) fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }
}

/// An adapter cell shareable between foreground code and the interrupt
/// vectors.
///
/// Firmware typically owns one as a `static`, places the adapter into it
/// during startup and wires both vectors to [`with_sd`] calls on it.
pub type SharedSd<H, CD> = Mutex<RefCell<Option<SdCard<H, CD>>>>;

/// Make an empty cell for [`with_sd`]. Usable in a `static` initializer.
pub const fn shared<H: SdHost, CD: InputPin>() -> SharedSd<H, CD> {
    Mutex::new(RefCell::new(None))
}

/// Run `f` on the adapter placed in `cell`. Returns `None` while the cell is
/// empty.
pub fn with_sd<H: SdHost, CD: InputPin, R>(
    cell: &SharedSd<H, CD>,
    f: impl FnOnce(&mut SdCard<H, CD>) -> R,
) -> Option<R> {
    critical_section::with(|cs| cell.borrow_ref_mut(cs).as_mut().map(f))
}

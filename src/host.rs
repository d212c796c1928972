//! The vendor host-controller boundary
//!
//! The SD/SDIO protocol itself (command sequencing, clock negotiation, CRC,
//! DMA chaining, error recovery) lives in a vendor-supplied driver. This
//! module is the seam: [`SdHost`] mirrors exactly the driver surface the
//! adapter configures and calls, nothing more. Firmware implements it over
//! the vendor library; the test suite implements it in software.

use fugit::{TimerDurationU32, TimerInstantU32};

use crate::card::{CardInfo, CardState};
use crate::config::{BusConfig, BusWidth};

/// Millisecond tick of the host's wall clock.
pub type Instant = TimerInstantU32<1000>;

/// Millisecond duration measured against [`Instant`].
pub type Duration = TimerDurationU32<1000>;

/// Raw status code from the vendor driver. Opaque to the adapter and carried
/// in errors for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HostError(pub i32);

/// Transfers that completed while servicing the bus interrupt. These are the
/// vendor driver's transfer-complete callbacks rendered as data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferEvents {
    pub read_done: bool,
    pub write_done: bool,
}

/// The vendor SD host controller driver as the adapter sees it.
///
/// Contract for implementations:
///
/// - `arm_read`/`arm_write` may stash the buffer pointer for the lifetime of
///   the transfer. The adapter keeps the memory resident and unaliased until
///   the matching completion event has been observed and the buffer
///   reclaimed, so the pointer stays valid for exactly that window.
/// - `service_irq` must tolerate being invoked with no interrupt pending and
///   report no events; the adapter also calls it from polling loops.
/// - `now` must be monotonic. Wrapping of the u32 millisecond tick is
///   handled by the adapter's duration arithmetic.
/// - Vendor state values outside [`CardState`]'s set should be reported as
///   [`CardState::Disconnected`], which the adapter treats as busy.
pub trait SdHost {
    /// One-time peripheral bring-up: pin muxing, peripheral clocks, the DMA
    /// stream and both interrupt priorities, all per `cfg`.
    fn setup(&mut self, cfg: &BusConfig);

    /// Return the controller to its reset state.
    fn reset(&mut self);

    /// Configure the controller from `cfg` and identify the card. The bus
    /// runs at one-bit width until [`SdHost::set_bus_width`] is called.
    fn init_card(&mut self, cfg: &BusConfig) -> Result<(), HostError>;

    /// Switch the data bus width after identification.
    fn set_bus_width(&mut self, width: BusWidth) -> Result<(), HostError>;

    /// Query the identified card's metadata.
    fn card_info(&mut self) -> Result<CardInfo, HostError>;

    /// Read the card's current state.
    fn card_state(&mut self) -> CardState;

    /// Arm a DMA read of `blocks` 512-byte blocks into `words`, starting at
    /// block address `block_addr`. Returns as soon as the transfer is
    /// accepted; completion arrives through [`SdHost::service_irq`].
    fn arm_read(
        &mut self,
        words: &mut [u32],
        block_addr: u32,
        blocks: u32,
    ) -> Result<(), HostError>;

    /// Arm a DMA write of `blocks` 512-byte blocks from `words`, starting at
    /// block address `block_addr`. Returns as soon as the transfer is
    /// accepted; completion arrives through [`SdHost::service_irq`].
    fn arm_write(&mut self, words: &[u32], block_addr: u32, blocks: u32) -> Result<(), HostError>;

    /// Run the driver's bus-interrupt service routine and report any
    /// transfers it completed.
    fn service_irq(&mut self) -> TransferEvents;

    /// Run the driver's DMA-stream service routine.
    fn service_dma_irq(&mut self);

    /// Current wall-clock tick.
    fn now(&mut self) -> Instant;
}

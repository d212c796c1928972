//! Test doubles for the host controller and the card-detect pin

use core::convert::Infallible;
use core::mem;

use embedded_hal::digital::v2::InputPin;
use std::boxed::Box;
use std::vec;
use std::vec::Vec;

use crate::card::{BLOCK_LEN, Block, CardInfo, CardKind, CardState, CardVersion};
use crate::config::{BusConfig, BusWidth};
use crate::host::{HostError, Instant, SdHost, TransferEvents};

/// Host controller over an in-memory card image.
///
/// Arming a transfer copies the data right away and pends the matching
/// completion event; the event surfaces once `service_irq` drains it, the
/// same split a real controller shows between DMA done and the interrupt
/// being serviced. Each `now` call advances the clock by `tick_step`
/// milliseconds.
pub struct MockHost {
    pub setup_calls: u32,
    pub reset_calls: u32,
    pub init_calls: u32,
    pub read_arms: u32,
    pub write_arms: u32,
    pub dma_services: u32,
    pub fail_init: Option<i32>,
    pub fail_card_info: Option<i32>,
    pub fail_bus_width: Option<i32>,
    pub fail_arm_read: Option<i32>,
    pub fail_arm_write: Option<i32>,
    /// When set, completion events never surface.
    pub swallow_events: bool,
    pub state: CardState,
    pub info: CardInfo,
    pub bus_width: Option<BusWidth>,
    pub ticks: u32,
    pub tick_step: u32,
    store: Vec<u8>,
    pending: TransferEvents,
}

impl MockHost {
    /// Blocks in the simulated card.
    pub const BLOCKS: usize = 64;

    pub fn new() -> Self {
        Self {
            setup_calls: 0,
            reset_calls: 0,
            init_calls: 0,
            read_arms: 0,
            write_arms: 0,
            dma_services: 0,
            fail_init: None,
            fail_card_info: None,
            fail_bus_width: None,
            fail_arm_read: None,
            fail_arm_write: None,
            swallow_events: false,
            state: CardState::Transfer,
            info: CardInfo {
                kind: CardKind::HighCapacity,
                version: CardVersion::V2,
                class: 0x5B5,
                rca: 1,
                block_count: Self::BLOCKS as u32,
                block_size: BLOCK_LEN as u32,
                logical_block_count: Self::BLOCKS as u32,
                logical_block_size: BLOCK_LEN as u32,
            },
            bus_width: None,
            ticks: 0,
            tick_step: 1,
            store: vec![0; Self::BLOCKS * BLOCK_LEN],
            pending: TransferEvents::default(),
        }
    }

    /// The bytes of one block of the card image.
    pub fn store_block(&mut self, block_addr: u32) -> &mut [u8] {
        let start = block_addr as usize * BLOCK_LEN;

        &mut self.store[start..start + BLOCK_LEN]
    }
}

impl SdHost for MockHost {
    fn setup(&mut self, _cfg: &BusConfig) {
        self.setup_calls += 1;
    }

    fn reset(&mut self) {
        self.reset_calls += 1;
    }

    fn init_card(&mut self, _cfg: &BusConfig) -> Result<(), HostError> {
        self.init_calls += 1;

        match self.fail_init {
            Some(code) => Err(HostError(code)),
            None => Ok(()),
        }
    }

    fn set_bus_width(&mut self, width: BusWidth) -> Result<(), HostError> {
        match self.fail_bus_width {
            Some(code) => Err(HostError(code)),
            None => {
                self.bus_width = Some(width);
                Ok(())
            }
        }
    }

    fn card_info(&mut self) -> Result<CardInfo, HostError> {
        match self.fail_card_info {
            Some(code) => Err(HostError(code)),
            None => Ok(self.info),
        }
    }

    fn card_state(&mut self) -> CardState {
        self.state
    }

    fn arm_read(
        &mut self,
        words: &mut [u32],
        block_addr: u32,
        blocks: u32,
    ) -> Result<(), HostError> {
        self.read_arms += 1;

        if let Some(code) = self.fail_arm_read {
            return Err(HostError(code));
        }

        assert_eq!(words.len() * 4, blocks as usize * BLOCK_LEN);
        let start = block_addr as usize * BLOCK_LEN;
        let end = start + blocks as usize * BLOCK_LEN;
        assert!(end <= self.store.len(), "read beyond the card image");

        bytemuck::cast_slice_mut::<u32, u8>(words).copy_from_slice(&self.store[start..end]);
        self.pending.read_done = true;

        Ok(())
    }

    fn arm_write(&mut self, words: &[u32], block_addr: u32, blocks: u32) -> Result<(), HostError> {
        self.write_arms += 1;

        if let Some(code) = self.fail_arm_write {
            return Err(HostError(code));
        }

        assert_eq!(words.len() * 4, blocks as usize * BLOCK_LEN);
        let start = block_addr as usize * BLOCK_LEN;
        let end = start + blocks as usize * BLOCK_LEN;
        assert!(end <= self.store.len(), "write beyond the card image");

        self.store[start..end].copy_from_slice(bytemuck::cast_slice::<u32, u8>(words));
        self.pending.write_done = true;

        Ok(())
    }

    fn service_irq(&mut self) -> TransferEvents {
        if self.swallow_events {
            return TransferEvents::default();
        }

        mem::take(&mut self.pending)
    }

    fn service_dma_irq(&mut self) {
        self.dma_services += 1;
    }

    fn now(&mut self) -> Instant {
        self.ticks = self.ticks.wrapping_add(self.tick_step);

        Instant::from_ticks(self.ticks)
    }
}

/// Card-detect input with a settable level.
pub struct MockPin {
    pub high: bool,
}

impl InputPin for MockPin {
    type Error = Infallible;

    fn is_high(&self) -> Result<bool, Infallible> {
        Ok(self.high)
    }

    fn is_low(&self) -> Result<bool, Infallible> {
        Ok(!self.high)
    }
}

/// Leak a zeroed block buffer, standing in for the firmware's static ones.
pub fn leak_blocks(len: usize) -> &'static mut [Block] {
    Box::leak(vec![Block::new(); len].into_boxed_slice())
}

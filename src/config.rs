//! Build-time configuration for the SDIO bus, pin set and DMA stream
//!
//! Everything here is plain data handed to the host driver during
//! [`setup`](crate::host::SdHost::setup). The defaults describe the common
//! wiring (data on PC8-PC11, command on PD2, clock on PC12, alternate
//! function 12, DMA2 stream 6 channel 4); boards that differ override the
//! fields before constructing the adapter.

/// GPIO banks of the target family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bank {
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
}

/// A single GPIO identified by bank and index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinId {
    pub bank: Bank,
    pub index: u8,
}

impl PinId {
    pub const fn new(bank: Bank, index: u8) -> Self {
        Self { bank, index }
    }
}

/// The six SDIO lines and their alternate-function number.
///
/// The clock line runs push-pull with no pull resistor; the command and data
/// lines are pulled up. All six are muxed to `alternate_fn` at the highest
/// slew rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SdioPins {
    pub clk: PinId,
    pub cmd: PinId,
    pub d0: PinId,
    pub d1: PinId,
    pub d2: PinId,
    pub d3: PinId,
    pub alternate_fn: u8,
}

impl Default for SdioPins {
    fn default() -> Self {
        Self {
            clk: PinId::new(Bank::C, 12),
            cmd: PinId::new(Bank::D, 2),
            d0: PinId::new(Bank::C, 8),
            d1: PinId::new(Bank::C, 9),
            d2: PinId::new(Bank::C, 10),
            d3: PinId::new(Bank::C, 11),
            alternate_fn: 12,
        }
    }
}

/// Clock edge the controller drives data on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockEdge {
    Rising,
    Falling,
}

/// Data bus width. Identification always runs at one bit; the adapter
/// switches to the configured width once the card is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusWidth {
    One,
    Four,
}

/// Arbitration priority of the DMA stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaPriority {
    Low,
    Medium,
    High,
    VeryHigh,
}

/// Burst length for one side of the DMA stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DmaBurst {
    Single,
    Incr4,
    Incr8,
    Incr16,
}

/// FIFO fill level that triggers a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FifoThreshold {
    Quarter,
    Half,
    ThreeQuarters,
    Full,
}

/// DMA stream selection and transfer shaping.
///
/// The controller is the flow controller, transfers run at word width on both
/// sides, and the same stream serves reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DmaConfig {
    pub stream: u8,
    pub channel: u8,
    pub priority: DmaPriority,
    pub fifo_threshold: FifoThreshold,
    pub memory_burst: DmaBurst,
    pub peripheral_burst: DmaBurst,
}

impl Default for DmaConfig {
    fn default() -> Self {
        Self {
            stream: 6,
            channel: 4,
            priority: DmaPriority::VeryHigh,
            fifo_threshold: FifoThreshold::Full,
            memory_burst: DmaBurst::Incr4,
            peripheral_burst: DmaBurst::Incr4,
        }
    }
}

/// Full bus configuration handed to the host driver.
///
/// `clock_div` follows the controller's divider relation
/// `SDIO_CK = SDIOCLK / (2 + clock_div)`, so the default of 0 yields 24 MHz
/// from the usual 48 MHz kernel clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    pub pins: SdioPins,
    pub clock_edge: ClockEdge,
    pub clock_bypass: bool,
    pub clock_power_save: bool,
    pub hardware_flow_control: bool,
    pub clock_div: u8,
    pub bus_width: BusWidth,
    pub dma: DmaConfig,
    /// Preemption priority of the bus controller vector, 0 is highest.
    pub bus_irq_priority: u8,
    /// Preemption priority of the DMA stream vector, 0 is highest.
    pub dma_irq_priority: u8,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            pins: SdioPins::default(),
            clock_edge: ClockEdge::Rising,
            clock_bypass: false,
            clock_power_save: false,
            hardware_flow_control: false,
            clock_div: 0,
            bus_width: BusWidth::Four,
            dma: DmaConfig::default(),
            bus_irq_priority: 0,
            dma_irq_priority: 0,
        }
    }
}

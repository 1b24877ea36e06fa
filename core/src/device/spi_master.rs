use std::collections::VecDeque;

use crate::core::{Component, SpiPins};

/// Single-peripheral SPI / Extended-SPI bus framer.
///
/// Frames one transaction at a time onto the serial bus: chip-select
/// assertion with a guard time, TX shift-out, an optional run of dummy
/// clocks, RX shift-in, and chip-select release with the same guard time.
/// Data is MSB first in SPI Mode 0 (clock idles low, both sides sample on
/// the rising edge, both sides change data after the falling edge).
///
/// # Framing states
///
/// | State           | Chip select | Clock     | Duration                      |
/// |-----------------|-------------|-----------|-------------------------------|
/// | `Idle`          | high        | low       | until `begin_transaction()`   |
/// | `SelectGuard`   | low         | low       | `guard_cycles` bus periods    |
/// | `Tx`            | low         | toggling  | 8 periods per TX byte         |
/// | `Wait`          | low         | toggling  | `wait_cycles` periods         |
/// | `Rx`            | low         | toggling  | 8 periods per RX byte         |
/// | `DeselectGuard` | high        | low       | `guard_cycles` bus periods    |
///
/// During `Wait` the data line is held low and nothing is sampled. Unlike
/// the reference framer, which stops the clock for the wait gap, SCK keeps
/// toggling here: the N25Q only advances through the dummy cycles of a
/// fast read on clock edges, so a stopped clock would never reach data.
///
/// # Clocking
///
/// The framer is ticked at the system clock. A clock-enable divider fires
/// every `half_period_ticks` system ticks; each enable advances the bus by
/// one half period. Pin outputs pass through one output register (one tick
/// of latency) and the controller-in line passes through a two-flop
/// synchronizer before it is sampled. RX bits are sampled on the enable
/// that ends the high half of each period, so `half_period_ticks` must be
/// at least 2 for the synchronized input to be settled.
///
/// # TX and RX queues
///
/// TX bytes are pulled from a bounded FIFO one byte at a time as each byte
/// starts shifting. A transaction may declare more TX bytes than it
/// preloads; the caller streams the rest through `push_tx()` while
/// `tx_ready()` is true. If the FIFO is empty when a byte is due, zeros are
/// shifted instead. Completed RX bytes go into a bounded FIFO; a byte that
/// arrives while the RX FIFO is full is dropped.
pub struct SpiMaster {
    config: SpiMasterConfig,
    state: FramerState,

    tx_fifo: VecDeque<u8>,
    rx_fifo: VecDeque<u8>,

    // Combinational outputs computed this tick, registered on the next.
    sck: bool,
    cs_n: bool,
    copi: bool,
    pins_q: SpiPins,

    // Controller-in synchronizer
    cipo_in: bool,
    cipo_meta: bool,
    cipo_sync: bool,

    ce_count: u32,
    guard_count: u32,
    tx_remaining: usize, // bytes not yet started
    wait_remaining: u32, // dummy periods not yet finished
    rx_remaining: usize, // bytes not yet finished
    shift: u8,
    bits_left: u8,
}

/// Timing and queue sizing of the framer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpiMasterConfig {
    /// System ticks per bus half period (clock-enable divider). Minimum 2.
    pub half_period_ticks: u32,
    /// Bus periods of chip-select setup before the first clock edge and of
    /// deselect time after the last one.
    pub guard_cycles: u32,
    /// Clamped to at least `MIN_TX_FIFO_DEPTH`.
    pub tx_fifo_depth: usize,
    pub rx_fifo_depth: usize,
}

impl Default for SpiMasterConfig {
    fn default() -> Self {
        Self {
            half_period_ticks: 2,
            guard_cycles: 4,
            tx_fifo_depth: 16,
            rx_fifo_depth: 16,
        }
    }
}

/// Longest preloaded header: opcode plus four address bytes. A shallower
/// TX FIFO could never start an erase, program or read.
pub const MIN_TX_FIFO_DEPTH: usize = 5;

/// Framer state, exposed for tests and tracing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramerState {
    Idle,
    SelectGuard,
    Tx,
    Wait,
    Rx,
    DeselectGuard,
}

/// One chip-select-bracketed bus cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusTransaction {
    tx_bytes: Vec<u8>,
    tx_len: usize,
    wait_cycles: u32,
    rx_len: usize,
}

impl BusTransaction {
    /// Transmit `tx_bytes`, clock `wait_cycles` dummy periods, then
    /// receive `rx_len` bytes.
    pub fn new(tx_bytes: &[u8], wait_cycles: u32, rx_len: usize) -> Self {
        Self {
            tx_bytes: tx_bytes.to_vec(),
            tx_len: tx_bytes.len(),
            wait_cycles,
            rx_len,
        }
    }

    /// Transmit `header` followed by `payload_len` bytes that the caller
    /// streams in with `SpiMaster::push_tx()` after the transaction starts.
    pub fn streaming(header: &[u8], payload_len: usize) -> Self {
        Self {
            tx_bytes: header.to_vec(),
            tx_len: header.len() + payload_len,
            wait_cycles: 0,
            rx_len: 0,
        }
    }

    /// Bytes loaded into the TX FIFO when the transaction begins.
    pub fn tx_bytes(&self) -> &[u8] {
        &self.tx_bytes
    }

    /// Total bytes shifted out, preloaded plus streamed.
    pub fn tx_len(&self) -> usize {
        self.tx_len
    }

    pub fn wait_cycles(&self) -> u32 {
        self.wait_cycles
    }

    pub fn rx_len(&self) -> usize {
        self.rx_len
    }
}

impl SpiMaster {
    pub fn new(config: SpiMasterConfig) -> Self {
        let config = SpiMasterConfig {
            half_period_ticks: config.half_period_ticks.max(2),
            guard_cycles: config.guard_cycles.max(1),
            tx_fifo_depth: config.tx_fifo_depth.max(MIN_TX_FIFO_DEPTH),
            rx_fifo_depth: config.rx_fifo_depth.max(1),
        };
        Self {
            config,
            state: FramerState::Idle,
            tx_fifo: VecDeque::with_capacity(config.tx_fifo_depth),
            rx_fifo: VecDeque::with_capacity(config.rx_fifo_depth),
            sck: false,
            cs_n: true,
            copi: false,
            pins_q: SpiPins::IDLE,
            cipo_in: false,
            cipo_meta: false,
            cipo_sync: false,
            ce_count: 0,
            guard_count: 0,
            tx_remaining: 0,
            wait_remaining: 0,
            rx_remaining: 0,
            shift: 0,
            bits_left: 0,
        }
    }

    pub fn config(&self) -> &SpiMasterConfig {
        &self.config
    }

    /// Start a transaction. Accepted only while idle and only if the
    /// preloaded bytes fit in the TX FIFO; returns false otherwise and
    /// leaves the framer untouched.
    pub fn begin_transaction(&mut self, txn: BusTransaction) -> bool {
        if self.state != FramerState::Idle {
            return false;
        }
        if txn.tx_bytes.len() > self.config.tx_fifo_depth - self.tx_fifo.len() {
            log::trace!(
                "spi: rejected transaction, {} preload bytes exceed TX FIFO",
                txn.tx_bytes.len()
            );
            return false;
        }

        log::trace!(
            "spi: begin tx={} wait={} rx={}",
            txn.tx_len,
            txn.wait_cycles,
            txn.rx_len
        );
        self.tx_fifo.extend(txn.tx_bytes.iter().copied());
        self.tx_remaining = txn.tx_len;
        self.wait_remaining = txn.wait_cycles;
        self.rx_remaining = txn.rx_len;
        self.ce_count = 0;
        self.sck = false;
        self.cs_n = false;
        self.copi = false;
        self.guard_count = self.config.guard_cycles * 2;
        self.state = FramerState::SelectGuard;
        true
    }

    /// True when no transaction is in progress.
    pub fn is_idle(&self) -> bool {
        self.state == FramerState::Idle
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// True when the TX FIFO can take another byte.
    pub fn tx_ready(&self) -> bool {
        self.tx_fifo.len() < self.config.tx_fifo_depth
    }

    /// Queue one TX byte. Returns false (byte not queued) if the FIFO is full.
    pub fn push_tx(&mut self, byte: u8) -> bool {
        if !self.tx_ready() {
            return false;
        }
        self.tx_fifo.push_back(byte);
        true
    }

    /// Take the oldest received byte.
    pub fn pop_rx(&mut self) -> Option<u8> {
        self.rx_fifo.pop_front()
    }

    pub fn rx_available(&self) -> usize {
        self.rx_fifo.len()
    }

    /// Registered pin outputs as seen by the peripheral this tick.
    pub fn pins(&self) -> SpiPins {
        self.pins_q
    }

    /// Latch the controller-in pin level for the next tick.
    pub fn set_cipo(&mut self, level: bool) {
        self.cipo_in = level;
    }

    /// Advance one bus half period. Returns true when the transaction ends.
    fn half_period(&mut self) -> bool {
        match self.state {
            FramerState::Idle => false,
            FramerState::SelectGuard => {
                self.guard_count = self.guard_count.saturating_sub(1);
                if self.guard_count == 0 {
                    self.next_phase();
                }
                false
            }
            FramerState::Tx => {
                if !self.sck {
                    self.sck = true;
                    return false;
                }
                self.sck = false;
                self.shift <<= 1;
                self.bits_left -= 1;
                if self.bits_left > 0 {
                    self.copi = self.shift & 0x80 != 0;
                } else if self.tx_remaining > 0 {
                    self.load_tx_byte();
                } else {
                    self.copi = false;
                    self.next_phase();
                }
                false
            }
            FramerState::Wait => {
                if !self.sck {
                    self.sck = true;
                    return false;
                }
                self.sck = false;
                self.wait_remaining -= 1;
                if self.wait_remaining == 0 {
                    self.next_phase();
                }
                false
            }
            FramerState::Rx => {
                if !self.sck {
                    self.sck = true;
                    return false;
                }
                self.shift = (self.shift << 1) | self.cipo_sync as u8;
                self.sck = false;
                self.bits_left -= 1;
                if self.bits_left == 0 {
                    if self.rx_fifo.len() < self.config.rx_fifo_depth {
                        self.rx_fifo.push_back(self.shift);
                    } else {
                        log::trace!("spi: RX FIFO full, dropped 0x{:02x}", self.shift);
                    }
                    self.rx_remaining -= 1;
                    if self.rx_remaining > 0 {
                        self.bits_left = 8;
                    } else {
                        self.next_phase();
                    }
                }
                false
            }
            FramerState::DeselectGuard => {
                self.cs_n = true;
                self.guard_count = self.guard_count.saturating_sub(1);
                if self.guard_count == 0 {
                    self.state = FramerState::Idle;
                    log::trace!("spi: transaction done");
                    return true;
                }
                false
            }
        }
    }

    /// Pick the next framing phase from the remaining counts.
    fn next_phase(&mut self) {
        if self.tx_remaining > 0 {
            self.load_tx_byte();
            self.state = FramerState::Tx;
        } else if self.wait_remaining > 0 {
            self.state = FramerState::Wait;
        } else if self.rx_remaining > 0 {
            self.shift = 0;
            self.bits_left = 8;
            self.state = FramerState::Rx;
        } else {
            // One extra half period raises chip select before the guard count.
            self.guard_count = self.config.guard_cycles * 2 + 1;
            self.state = FramerState::DeselectGuard;
        }
    }

    /// Move the next TX byte into the shift register; zeros on underflow.
    fn load_tx_byte(&mut self) {
        self.shift = self.tx_fifo.pop_front().unwrap_or(0x00);
        self.bits_left = 8;
        self.tx_remaining -= 1;
        self.copi = self.shift & 0x80 != 0;
    }
}

impl Component for SpiMaster {
    fn tick(&mut self) -> bool {
        // Output register, then two-flop input synchronizer.
        self.pins_q = SpiPins {
            sck: self.sck,
            cs_n: self.cs_n,
            copi: self.copi,
        };
        self.cipo_sync = self.cipo_meta;
        self.cipo_meta = self.cipo_in;

        if self.state == FramerState::Idle {
            return false;
        }
        self.ce_count += 1;
        if self.ce_count < self.config.half_period_ticks {
            return false;
        }
        self.ce_count = 0;
        self.half_period()
    }

    fn reset(&mut self) {
        *self = Self::new(self.config);
    }
}

impl Default for SpiMaster {
    fn default() -> Self {
        Self::new(SpiMasterConfig::default())
    }
}

use crate::core::{Component, SpiPeripheral, SpiPins};
use crate::device::sf3::{FlashGeometry, PAGE_SIZE, SUBSECTOR_SIZE, opcode};

/// Micron N25Q 256 Mbit serial NOR flash, behavioral model.
///
/// Models the subset of the Extended-SPI command set the tester uses, at
/// the pin level: commands are decoded from SCK/CS#/DQ0 edges and the
/// response is driven on DQ1.
///
/// # Supported commands
///
/// | Opcode | Name                              | Address | Dummy | Data        |
/// |--------|-----------------------------------|---------|-------|-------------|
/// | 0x06   | Write Enable                      | -       | -     | -           |
/// | 0x04   | Write Disable                     | -       | -     | -           |
/// | 0x01   | Write Status Register             | -       | -     | 1 in        |
/// | 0x61   | Write Enhanced Volatile Config    | -       | -     | 1 in        |
/// | 0x21   | 4-byte Subsector Erase            | 4 bytes | -     | -           |
/// | 0x12   | 4-byte Page Program               | 4 bytes | -     | 1..256 in   |
/// | 0x0C   | 4-byte Fast Read                  | 4 bytes | 8     | n out       |
/// | 0x05   | Read Status Register              | -       | -     | repeats out |
/// | 0x70   | Read Flag Status Register         | -       | -     | repeats out |
///
/// Write-type commands take effect when CS# rises, require the write
/// enable latch, clear it, and are ignored while the chip is busy. Erase,
/// program and write-status start a busy period counted in system ticks;
/// while busy, status bit 0 (WIP) is set and flag-status bit 7 is clear.
///
/// Programming can only clear bits (`old & new`) and wraps within the
/// addressed 256-byte page. Erase sets the aligned 4 KiB subsector to 0xFF.
/// Unknown opcodes are ignored until the next chip select.
pub struct N25q {
    memory: Vec<u8>,
    timing: N25qTiming,

    // Bus-side decode state
    prev_pins: SpiPins,
    selected: bool,
    phase: Phase,
    opcode: u8,
    address: u32,
    address_bytes: u8,
    in_shift: u8,
    in_bits: u8,
    out_shift: u8,
    out_bits: u8,
    cipo: bool,
    data_in: Vec<u8>,

    // Registers
    status_bits: u8, // bits 7:2 of the status register (non-volatile part)
    write_enable: bool,
    volatile_config: u8,
    busy_ticks: u32,
    stuck_busy: bool,
}

/// Busy durations of the embedded program/erase controller, in system ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct N25qTiming {
    pub erase_busy_ticks: u32,
    pub program_busy_ticks: u32,
    pub write_status_busy_ticks: u32,
}

impl Default for N25qTiming {
    fn default() -> Self {
        Self {
            erase_busy_ticks: 4_000,
            program_busy_ticks: 1_000,
            write_status_busy_ticks: 200,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Opcode,
    Address,
    Dummy(u32),
    DataIn,
    ReadOut,
    StatusOut,
    FlagOut,
    Ignore,
}

const STATUS_WIP: u8 = 0x01;
const STATUS_WEL: u8 = 0x02;
const FLAG_READY: u8 = 0x80;
const VOLATILE_CONFIG_DEFAULT: u8 = 0xFB;

impl N25q {
    /// Create a chip of `geometry.total_bytes()` capacity, fully erased.
    pub fn new(geometry: FlashGeometry, timing: N25qTiming) -> Self {
        Self {
            memory: vec![0xFF; geometry.total_bytes() as usize],
            timing,
            prev_pins: SpiPins::IDLE,
            selected: false,
            phase: Phase::Opcode,
            opcode: 0,
            address: 0,
            address_bytes: 0,
            in_shift: 0,
            in_bits: 0,
            out_shift: 0,
            out_bits: 0,
            cipo: false,
            data_in: Vec::with_capacity(PAGE_SIZE),
            status_bits: 0,
            write_enable: false,
            volatile_config: VOLATILE_CONFIG_DEFAULT,
            busy_ticks: 0,
            stuck_busy: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.memory.len()
    }

    /// Read a byte straight from the array (no bus traffic).
    pub fn read(&self, address: u32) -> u8 {
        self.memory[self.index(address)]
    }

    /// Direct view of the whole array.
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Overwrite array contents directly, e.g. to preload a test image.
    pub fn load(&mut self, address: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            let index = self.index(address.wrapping_add(i as u32));
            self.memory[index] = byte;
        }
    }

    /// Fault injection: invert one stored bit.
    pub fn flip_bit(&mut self, address: u32, bit: u8) {
        let index = self.index(address);
        self.memory[index] ^= 1 << (bit & 7);
    }

    /// Fault injection: hold the chip busy until cleared.
    pub fn set_stuck_busy(&mut self, stuck: bool) {
        self.stuck_busy = stuck;
    }

    pub fn is_busy(&self) -> bool {
        self.stuck_busy || self.busy_ticks > 0
    }

    pub fn write_enabled(&self) -> bool {
        self.write_enable
    }

    /// Status register as returned by opcode 0x05.
    pub fn status_register(&self) -> u8 {
        let mut status = self.status_bits & 0xFC;
        if self.write_enable {
            status |= STATUS_WEL;
        }
        if self.is_busy() {
            status |= STATUS_WIP;
        }
        status
    }

    /// Flag status register as returned by opcode 0x70. Bit 0 reports
    /// 4-byte addressing, which the 4-byte opcodes always use.
    pub fn flag_status_register(&self) -> u8 {
        let ready = if self.is_busy() { 0 } else { FLAG_READY };
        ready | 0x01
    }

    pub fn volatile_config(&self) -> u8 {
        self.volatile_config
    }

    fn index(&self, address: u32) -> usize {
        address as usize % self.memory.len()
    }

    fn select(&mut self) {
        self.selected = true;
        self.phase = Phase::Opcode;
        self.opcode = 0;
        self.address = 0;
        self.address_bytes = 0;
        self.in_shift = 0;
        self.in_bits = 0;
        self.out_bits = 0;
        self.data_in.clear();
    }

    fn deselect(&mut self) {
        self.selected = false;
        self.cipo = false;
        self.execute();
    }

    fn rising_edge(&mut self, copi: bool) {
        if let Phase::Dummy(remaining) = self.phase {
            self.phase = if remaining > 1 {
                Phase::Dummy(remaining - 1)
            } else {
                Phase::ReadOut
            };
            return;
        }
        self.in_shift = (self.in_shift << 1) | copi as u8;
        self.in_bits += 1;
        if self.in_bits == 8 {
            self.in_bits = 0;
            let byte = self.in_shift;
            self.receive_byte(byte);
        }
    }

    fn falling_edge(&mut self) {
        if !matches!(
            self.phase,
            Phase::ReadOut | Phase::StatusOut | Phase::FlagOut
        ) {
            return;
        }
        if self.out_bits == 0 {
            self.out_shift = match self.phase {
                Phase::StatusOut => self.status_register(),
                Phase::FlagOut => self.flag_status_register(),
                _ => {
                    let byte = self.read(self.address);
                    self.address = self.address.wrapping_add(1) % self.memory.len() as u32;
                    byte
                }
            };
            self.out_bits = 8;
        }
        self.cipo = self.out_shift & 0x80 != 0;
        self.out_shift <<= 1;
        self.out_bits -= 1;
    }

    fn receive_byte(&mut self, byte: u8) {
        match self.phase {
            Phase::Opcode => {
                self.opcode = byte;
                self.phase = match byte {
                    opcode::WRITE_ENABLE | opcode::WRITE_DISABLE => Phase::Ignore,
                    opcode::WRITE_STATUS_REGISTER | opcode::WRITE_ENHANCED_VOLATILE_CONFIG => {
                        Phase::DataIn
                    }
                    opcode::SUBSECTOR_ERASE_4B
                    | opcode::PAGE_PROGRAM_4B
                    | opcode::FAST_READ_4B => Phase::Address,
                    opcode::READ_STATUS_REGISTER => Phase::StatusOut,
                    opcode::READ_FLAG_STATUS_REGISTER => Phase::FlagOut,
                    _ => {
                        log::trace!("n25q: ignoring opcode 0x{byte:02x}");
                        self.opcode = 0;
                        Phase::Ignore
                    }
                };
            }
            Phase::Address => {
                self.address = (self.address << 8) | byte as u32;
                self.address_bytes += 1;
                if self.address_bytes == 4 {
                    self.phase = match self.opcode {
                        opcode::FAST_READ_4B => Phase::Dummy(opcode::FAST_READ_DUMMY_CYCLES),
                        opcode::PAGE_PROGRAM_4B => Phase::DataIn,
                        _ => Phase::Ignore,
                    };
                }
            }
            Phase::DataIn => {
                if self.data_in.len() == PAGE_SIZE {
                    // Only the last 256 bytes sent are programmed.
                    self.data_in.remove(0);
                }
                self.data_in.push(byte);
            }
            _ => {}
        }
    }

    /// Apply a write-type command at the end of its chip-select cycle.
    fn execute(&mut self) {
        let complete_address = self.address_bytes == 4;
        match self.opcode {
            opcode::WRITE_ENABLE if !self.is_busy() => self.write_enable = true,
            opcode::WRITE_DISABLE if !self.is_busy() => self.write_enable = false,
            opcode::WRITE_STATUS_REGISTER if self.write_allowed() => {
                if let Some(&value) = self.data_in.first() {
                    self.status_bits = value & 0xFC;
                    self.start_busy(self.timing.write_status_busy_ticks);
                }
            }
            opcode::WRITE_ENHANCED_VOLATILE_CONFIG if self.write_allowed() => {
                if let Some(&value) = self.data_in.first() {
                    self.volatile_config = value;
                    self.write_enable = false;
                }
            }
            opcode::SUBSECTOR_ERASE_4B if complete_address && self.write_allowed() => {
                let base = self.index(self.address) & !(SUBSECTOR_SIZE - 1);
                self.memory[base..base + SUBSECTOR_SIZE].fill(0xFF);
                log::trace!("n25q: erased subsector 0x{base:08x}");
                self.start_busy(self.timing.erase_busy_ticks);
            }
            opcode::PAGE_PROGRAM_4B
                if complete_address && !self.data_in.is_empty() && self.write_allowed() =>
            {
                let start = self.index(self.address);
                let page_base = start & !(PAGE_SIZE - 1);
                let offset = start & (PAGE_SIZE - 1);
                for (i, &byte) in self.data_in.iter().enumerate() {
                    let index = page_base + (offset + i) % PAGE_SIZE;
                    self.memory[index] &= byte;
                }
                self.start_busy(self.timing.program_busy_ticks);
            }
            _ => {}
        }
        self.opcode = 0;
    }

    fn write_allowed(&self) -> bool {
        self.write_enable && !self.is_busy()
    }

    fn start_busy(&mut self, ticks: u32) {
        self.write_enable = false;
        self.busy_ticks = ticks.max(1);
    }
}

impl SpiPeripheral for N25q {
    fn drive(&mut self, pins: SpiPins) {
        let prev = self.prev_pins;
        self.prev_pins = pins;

        if prev.cs_n && !pins.cs_n {
            self.select();
            return;
        }
        if !prev.cs_n && pins.cs_n {
            self.deselect();
            return;
        }
        if !self.selected {
            return;
        }
        if !prev.sck && pins.sck {
            self.rising_edge(pins.copi);
        } else if prev.sck && !pins.sck {
            self.falling_edge();
        }
    }

    fn cipo(&self) -> bool {
        self.cipo
    }
}

impl Component for N25q {
    fn tick(&mut self) -> bool {
        if self.busy_ticks > 0 && !self.stuck_busy {
            self.busy_ticks -= 1;
            return self.busy_ticks == 0;
        }
        false
    }

    /// Power cycle: volatile state is lost, the array is kept.
    fn reset(&mut self) {
        self.prev_pins = SpiPins::IDLE;
        self.selected = false;
        self.phase = Phase::Opcode;
        self.opcode = 0;
        self.cipo = false;
        self.data_in.clear();
        self.write_enable = false;
        self.volatile_config = VOLATILE_CONFIG_DEFAULT;
        self.busy_ticks = 0;
    }
}

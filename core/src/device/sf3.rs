use std::collections::VecDeque;

use thiserror::Error;

use crate::device::spi_master::{BusTransaction, SpiMaster};

/// N25Q Extended-SPI opcodes.
pub mod opcode {
    pub const WRITE_ENABLE: u8 = 0x06;
    pub const WRITE_DISABLE: u8 = 0x04;
    pub const WRITE_STATUS_REGISTER: u8 = 0x01;
    pub const WRITE_ENHANCED_VOLATILE_CONFIG: u8 = 0x61;
    pub const SUBSECTOR_ERASE_4B: u8 = 0x21;
    pub const PAGE_PROGRAM_4B: u8 = 0x12;
    pub const FAST_READ_4B: u8 = 0x0C;
    pub const READ_STATUS_REGISTER: u8 = 0x05;
    pub const READ_FLAG_STATUS_REGISTER: u8 = 0x70;

    /// Dummy clocks between the address and the first data byte of 0x0C.
    pub const FAST_READ_DUMMY_CYCLES: u32 = 8;
}

/// Status register bit 0: write in progress.
pub const STATUS_BUSY: u8 = 0x01;
/// Flag status register bit 7: program/erase controller ready.
pub const FLAG_READY: u8 = 0x80;

pub const PAGE_SIZE: usize = 256;
pub const SUBSECTOR_SIZE: usize = 4096;
pub const PARTITIONS: u32 = 32;

/// Address-space layout of the device under test.
///
/// The tester splits the array into 32 equal partitions and runs one
/// partition per test; everything else is derived from the total size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlashGeometry {
    total_bytes: u32,
}

impl FlashGeometry {
    /// 256 Mbit.
    pub const N25Q256_BYTES: u32 = 33_554_432;

    /// `total_bytes` is rounded down to a whole number of subsectors per
    /// partition, with a floor of one subsector per partition.
    pub fn new(total_bytes: u32) -> Self {
        let unit = SUBSECTOR_SIZE as u32 * PARTITIONS;
        Self {
            total_bytes: (total_bytes / unit).max(1) * unit,
        }
    }

    /// One subsector per partition; lets whole-device runs finish quickly.
    pub fn small() -> Self {
        Self::new(SUBSECTOR_SIZE as u32 * PARTITIONS)
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn partition_bytes(&self) -> u32 {
        self.total_bytes / PARTITIONS
    }

    pub fn subsectors_per_partition(&self) -> u32 {
        self.partition_bytes() / SUBSECTOR_SIZE as u32
    }

    pub fn pages_per_partition(&self) -> u32 {
        self.partition_bytes() / PAGE_SIZE as u32
    }

    /// First byte of partition `index`.
    pub fn partition_start(&self, index: u32) -> u32 {
        index * self.partition_bytes()
    }
}

impl Default for FlashGeometry {
    fn default() -> Self {
        Self::new(Self::N25Q256_BYTES)
    }
}

/// One request to the command sequencer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashCommand {
    ReadStatus,
    /// Single write-status transaction. The chip ignores it unless a
    /// `WriteEnable` was issued first.
    WriteStatusRegister(u8),
    WriteEnable,
    /// Write enable, erase the 4 KiB subsector holding the address, then
    /// poll flag status until ready.
    EraseSubsector(u32),
    /// Write enable, program one page with 256 bytes pulled from the
    /// `DataPort`, then poll flag status until ready.
    PageProgram(u32),
    /// Fast read of `length` bytes pushed to the `DataPort`.
    RandomRead { address: u32, length: usize },
    ReadFlagStatus,
}

/// Producer of page-program data and consumer of read data.
///
/// Passed into every `Sf3Sequencer::tick()`; only the command in flight
/// calls it.
pub trait DataPort {
    fn next_program_byte(&mut self) -> u8;
    fn accept_read_byte(&mut self, byte: u8);
}

/// Last observed register values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeviceStatus {
    pub status_register: u8,
    pub flag_status_register: u8,
}

impl DeviceStatus {
    pub fn busy(&self) -> bool {
        self.status_register & STATUS_BUSY != 0
    }

    pub fn ready(&self) -> bool {
        self.flag_status_register & FLAG_READY != 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SequencerConfig {
    /// Value written to the status register by the boot sequence.
    pub boot_status_value: u8,
    /// Give up on a status poll after this many not-ready answers. `None`
    /// polls forever, so a chip stuck busy hangs the sequencer.
    pub poll_limit: Option<u32>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            boot_status_value: 0x00,
            poll_limit: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum SequencerError {
    #[error("flash not ready after {polls} polls of opcode 0x{opcode:02x}")]
    ChipNotReady { opcode: u8, polls: u32 },
}

/// One bus transaction of a command sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Step {
    ReadStatus,
    ReadFlagStatus,
    PollStatusUntilIdle,
    PollFlagUntilReady,
    WriteEnable,
    WriteStatus(u8),
    Erase(u32),
    Program(u32),
    Read { address: u32, length: usize },
}

impl Step {
    fn transaction(self) -> BusTransaction {
        match self {
            Step::ReadStatus | Step::PollStatusUntilIdle => {
                BusTransaction::new(&[opcode::READ_STATUS_REGISTER], 0, 1)
            }
            Step::ReadFlagStatus | Step::PollFlagUntilReady => {
                BusTransaction::new(&[opcode::READ_FLAG_STATUS_REGISTER], 0, 1)
            }
            Step::WriteEnable => BusTransaction::new(&[opcode::WRITE_ENABLE], 0, 0),
            Step::WriteStatus(value) => {
                BusTransaction::new(&[opcode::WRITE_STATUS_REGISTER, value], 0, 0)
            }
            Step::Erase(address) => {
                BusTransaction::new(&addressed(opcode::SUBSECTOR_ERASE_4B, address), 0, 0)
            }
            Step::Program(address) => {
                BusTransaction::streaming(&addressed(opcode::PAGE_PROGRAM_4B, address), PAGE_SIZE)
            }
            Step::Read { address, length } => BusTransaction::new(
                &addressed(opcode::FAST_READ_4B, address),
                opcode::FAST_READ_DUMMY_CYCLES,
                length,
            ),
        }
    }

    fn opcode(self) -> u8 {
        match self {
            Step::ReadStatus | Step::PollStatusUntilIdle => opcode::READ_STATUS_REGISTER,
            Step::ReadFlagStatus | Step::PollFlagUntilReady => opcode::READ_FLAG_STATUS_REGISTER,
            Step::WriteEnable => opcode::WRITE_ENABLE,
            Step::WriteStatus(_) => opcode::WRITE_STATUS_REGISTER,
            Step::Erase(_) => opcode::SUBSECTOR_ERASE_4B,
            Step::Program(_) => opcode::PAGE_PROGRAM_4B,
            Step::Read { .. } => opcode::FAST_READ_4B,
        }
    }
}

fn addressed(op: u8, address: u32) -> [u8; 5] {
    let [a3, a2, a1, a0] = address.to_be_bytes();
    [op, a3, a2, a1, a0]
}

#[derive(Clone, Copy, Debug)]
struct InFlight {
    step: Step,
    started: bool,
    streamed: usize,
    polls: u32,
}

/// N25Q command sequencer.
///
/// Turns one `FlashCommand` at a time into the fixed series of bus
/// transactions the chip needs and drives them through the `SpiMaster`.
/// Admission is the only flow control: `submit()` is refused unless the
/// sequencer is idle. After construction or `reset()` the boot sequence
/// runs first (poll status until not busy, write enable, write status
/// register, poll flag status until ready), so the sequencer is not idle
/// until the chip has been initialized.
///
/// Completion of erase and program is detected purely by polling the flag
/// status register. Unless `SequencerConfig::poll_limit` is set, a chip
/// that never reports ready keeps the sequencer busy forever.
pub struct Sf3Sequencer {
    config: SequencerConfig,
    steps: VecDeque<Step>,
    current: Option<InFlight>,
    booting: bool,
    status: DeviceStatus,
    error: Option<SequencerError>,
}

impl Sf3Sequencer {
    pub fn new(config: SequencerConfig) -> Self {
        let mut sequencer = Self {
            config,
            steps: VecDeque::with_capacity(4),
            current: None,
            booting: false,
            status: DeviceStatus::default(),
            error: None,
        };
        sequencer.queue_boot();
        sequencer
    }

    fn queue_boot(&mut self) {
        self.steps.clear();
        self.steps.extend([
            Step::PollStatusUntilIdle,
            Step::WriteEnable,
            Step::WriteStatus(self.config.boot_status_value),
            Step::PollFlagUntilReady,
        ]);
        self.current = None;
        self.booting = true;
    }

    pub fn config(&self) -> &SequencerConfig {
        &self.config
    }

    /// True when no command (and no boot sequence) is in progress.
    pub fn is_idle(&self) -> bool {
        self.current.is_none() && self.steps.is_empty()
    }

    pub fn is_booting(&self) -> bool {
        self.booting
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.status
    }

    /// Take the error left by the last abandoned command, if any.
    pub fn take_error(&mut self) -> Option<SequencerError> {
        self.error.take()
    }

    /// Queue a command. Returns false, changing nothing, if busy.
    pub fn submit(&mut self, command: FlashCommand) -> bool {
        if !self.is_idle() {
            log::trace!("sf3: busy, ignored {command:?}");
            return false;
        }
        log::debug!("sf3: {command:?}");
        match command {
            FlashCommand::ReadStatus => self.steps.push_back(Step::ReadStatus),
            FlashCommand::ReadFlagStatus => self.steps.push_back(Step::ReadFlagStatus),
            FlashCommand::WriteEnable => self.steps.push_back(Step::WriteEnable),
            FlashCommand::WriteStatusRegister(value) => {
                self.steps.push_back(Step::WriteStatus(value))
            }
            FlashCommand::EraseSubsector(address) => self.steps.extend([
                Step::WriteEnable,
                Step::Erase(address),
                Step::PollFlagUntilReady,
            ]),
            FlashCommand::PageProgram(address) => self.steps.extend([
                Step::WriteEnable,
                Step::Program(address),
                Step::PollFlagUntilReady,
            ]),
            FlashCommand::RandomRead { address, length } => {
                self.steps.push_back(Step::Read { address, length })
            }
        }
        true
    }

    /// Advance one system tick. Call after the framer has been ticked.
    /// Returns true on the tick a command (or the boot sequence) finishes.
    pub fn tick(&mut self, master: &mut SpiMaster, port: &mut dyn DataPort) -> bool {
        if self.current.is_none() {
            match self.steps.pop_front() {
                Some(step) => {
                    self.current = Some(InFlight {
                        step,
                        started: false,
                        streamed: 0,
                        polls: 0,
                    })
                }
                None => return false,
            }
        }
        let Some(mut flight) = self.current else {
            return false;
        };

        if !flight.started {
            if !master.begin_transaction(flight.step.transaction()) {
                self.current = Some(flight);
                return false;
            }
            flight.started = true;
        }

        match flight.step {
            Step::Program(_) => {
                while flight.streamed < PAGE_SIZE && master.tx_ready() {
                    master.push_tx(port.next_program_byte());
                    flight.streamed += 1;
                }
            }
            Step::Read { .. } => {
                while let Some(byte) = master.pop_rx() {
                    port.accept_read_byte(byte);
                }
            }
            _ => {}
        }

        if !master.is_idle() {
            self.current = Some(flight);
            return false;
        }
        self.finish_step(flight, master)
    }

    /// The transaction of `flight` is off the bus.
    fn finish_step(&mut self, mut flight: InFlight, master: &mut SpiMaster) -> bool {
        let mut satisfied = true;
        match flight.step {
            Step::ReadStatus | Step::PollStatusUntilIdle => {
                if let Some(value) = master.pop_rx() {
                    self.status.status_register = value;
                }
                satisfied = flight.step == Step::ReadStatus || !self.status.busy();
            }
            Step::ReadFlagStatus | Step::PollFlagUntilReady => {
                if let Some(value) = master.pop_rx() {
                    self.status.flag_status_register = value;
                }
                satisfied = flight.step == Step::ReadFlagStatus || self.status.ready();
            }
            _ => {}
        }

        if !satisfied {
            flight.polls += 1;
            if self.config.poll_limit.is_some_and(|limit| flight.polls >= limit) {
                let error = SequencerError::ChipNotReady {
                    opcode: flight.step.opcode(),
                    polls: flight.polls,
                };
                log::warn!("sf3: {error}, abandoning command");
                self.error = Some(error);
                self.steps.clear();
                self.current = None;
                self.booting = false;
                return true;
            }
            flight.started = false;
            self.current = Some(flight);
            return false;
        }

        self.current = None;
        if !self.steps.is_empty() {
            return false;
        }
        if self.booting {
            self.booting = false;
            log::info!("sf3: boot sequence complete");
        }
        true
    }

    /// Drop any command in flight and rerun the boot sequence. The framer
    /// must be reset alongside.
    pub fn reset(&mut self) {
        self.status = DeviceStatus::default();
        self.error = None;
        self.queue_boot();
    }
}

impl Default for Sf3Sequencer {
    fn default() -> Self {
        Self::new(SequencerConfig::default())
    }
}

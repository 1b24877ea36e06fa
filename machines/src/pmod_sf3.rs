use sftester_core::core::machine::InputButton;
use sftester_core::core::{Component, SpiPeripheral};
use sftester_core::device::n25q::{N25q, N25qTiming};
use sftester_core::device::sf3::{DataPort, FlashGeometry, SequencerConfig, Sf3Sequencer};
use sftester_core::device::spi_master::{SpiMaster, SpiMasterConfig};

use crate::tester_fsm::{TesterConfig, UserInputs};

// ---------------------------------------------------------------------------
// Input wiring
// ---------------------------------------------------------------------------

pub const INPUT_BTN0: u8 = 0;
pub const INPUT_BTN1: u8 = 1;
pub const INPUT_BTN2: u8 = 2;
pub const INPUT_BTN3: u8 = 3;
pub const INPUT_SW0: u8 = 4;
pub const INPUT_SW1: u8 = 5;
pub const INPUT_SW2: u8 = 6;
pub const INPUT_SW3: u8 = 7;

pub const SF3_INPUT_MAP: &[InputButton] = &[
    InputButton { id: INPUT_BTN0, name: "BTN0" },
    InputButton { id: INPUT_BTN1, name: "BTN1" },
    InputButton { id: INPUT_BTN2, name: "BTN2" },
    InputButton { id: INPUT_BTN3, name: "BTN3" },
    InputButton { id: INPUT_SW0, name: "SW0" },
    InputButton { id: INPUT_SW1, name: "SW1" },
    InputButton { id: INPUT_SW2, name: "SW2" },
    InputButton { id: INPUT_SW3, name: "SW3" },
];

/// Latch a button or switch level into `inputs`. Unknown IDs are ignored.
pub(crate) fn apply_input(inputs: &mut UserInputs, id: u8, pressed: bool) {
    let (reg, bit) = match id {
        INPUT_BTN0..=INPUT_BTN3 => (&mut inputs.buttons, id),
        INPUT_SW0..=INPUT_SW3 => (&mut inputs.switches, id - INPUT_SW0),
        _ => return,
    };
    if pressed {
        *reg |= 1 << bit;
    } else {
        *reg &= !(1 << bit);
    }
}

// ---------------------------------------------------------------------------
// Board configuration
// ---------------------------------------------------------------------------

/// Everything needed to build a tester board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoardConfig {
    pub geometry: FlashGeometry,
    pub spi: SpiMasterConfig,
    pub sequencer: SequencerConfig,
    pub flash: N25qTiming,
    pub tester: TesterConfig,
    /// System ticks per `run_frame()` of the synchronous board.
    pub frame_ticks: u64,
}

impl BoardConfig {
    /// Reduced geometry with the reference timing.
    pub fn small() -> Self {
        Self {
            geometry: FlashGeometry::small(),
            ..Self::default()
        }
    }
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            geometry: FlashGeometry::default(),
            spi: SpiMasterConfig::default(),
            sequencer: SequencerConfig::default(),
            flash: N25qTiming::default(),
            tester: TesterConfig::default(),
            frame_ticks: 100_000,
        }
    }
}

// ---------------------------------------------------------------------------
// Sf3Board
// ---------------------------------------------------------------------------

/// Pmod SF3 wiring: the SPI framer and command sequencer on the FPGA side,
/// the N25Q flash on the far end of the bus.
///
/// Both tester variants compose this struct and differ only in how they
/// schedule the orchestrator around it.
pub struct Sf3Board {
    pub(crate) master: SpiMaster,
    pub(crate) sequencer: Sf3Sequencer,
    pub(crate) flash: N25q,
    pub(crate) clock: u64,
}

impl Sf3Board {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            master: SpiMaster::new(config.spi),
            sequencer: Sf3Sequencer::new(config.sequencer),
            flash: N25q::new(config.geometry, config.flash),
            clock: 0,
        }
    }

    /// One system clock. Returns true when the sequencer finishes a
    /// command.
    pub fn tick(&mut self, port: &mut dyn DataPort) -> bool {
        self.flash.drive(self.master.pins());
        self.flash.tick();
        self.master.set_cipo(self.flash.cipo());
        self.master.tick();
        self.clock += 1;
        self.sequencer.tick(&mut self.master, port)
    }

    /// Tick until the sequencer has nothing in flight. Returns the ticks
    /// spent. Hangs, like the hardware, if the chip never becomes ready
    /// and no poll limit is configured.
    pub fn run_until_idle(&mut self, port: &mut dyn DataPort) -> u64 {
        let start = self.clock;
        while !self.sequencer.is_idle() {
            self.tick(port);
        }
        self.clock - start
    }

    pub fn master(&self) -> &SpiMaster {
        &self.master
    }

    pub fn sequencer(&self) -> &Sf3Sequencer {
        &self.sequencer
    }

    pub fn flash(&self) -> &N25q {
        &self.flash
    }

    /// Fault injection access.
    pub fn flash_mut(&mut self) -> &mut N25q {
        &mut self.flash
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// Reset the FPGA side and power-cycle the flash. Array contents survive.
    pub fn reset(&mut self) {
        self.master.reset();
        self.sequencer.reset();
        self.flash.reset();
        self.clock = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoData;

    impl DataPort for NoData {
        fn next_program_byte(&mut self) -> u8 {
            0xFF
        }

        fn accept_read_byte(&mut self, _byte: u8) {}
    }

    #[test]
    fn input_ids_map_to_lines() {
        let mut inputs = UserInputs::default();
        apply_input(&mut inputs, INPUT_BTN2, true);
        apply_input(&mut inputs, INPUT_SW3, true);
        assert_eq!(inputs.buttons, 0b0100);
        assert_eq!(inputs.switches, 0b1000);
        apply_input(&mut inputs, INPUT_BTN2, false);
        apply_input(&mut inputs, 42, true);
        assert_eq!(inputs.buttons, 0);
    }

    #[test]
    fn boots_and_goes_idle() {
        let mut board = Sf3Board::new(&BoardConfig::small());
        assert!(!board.sequencer().is_idle());
        let ticks = board.run_until_idle(&mut NoData);
        assert!(ticks > 0);
        assert!(board.sequencer().device_status().ready());
        assert!(board.master().is_idle());
    }
}

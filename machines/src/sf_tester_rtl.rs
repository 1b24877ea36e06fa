use sftester_core::core::machine::{InputButton, Machine, RunStatus};
use sftester_core::core::status::StatusSink;

use crate::pmod_sf3::{BoardConfig, SF3_INPUT_MAP, Sf3Board, apply_input};
use crate::registry::MachineEntry;
use crate::status_leds::leds_for;
use crate::status_text::status_for;
use crate::tester_fsm::{TesterFsm, TesterPhase, UserInputs};

/// Tester built as synchronous logic.
///
/// Every component advances once per system clock: flash model, framer,
/// command sequencer, then the orchestrator. Commands overlap with the
/// orchestrator's own steps, so the dwell timers and the status refresh
/// are counted in system ticks.
pub struct SfTesterRtl {
    board: Sf3Board,
    fsm: TesterFsm,
    inputs: UserInputs,
    frame_ticks: u64,
}

impl SfTesterRtl {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            board: Sf3Board::new(config),
            fsm: TesterFsm::new(config.tester, config.geometry),
            inputs: UserInputs::default(),
            frame_ticks: config.frame_ticks.max(1),
        }
    }

    /// One system clock.
    pub fn tick(&mut self) {
        self.board.tick(&mut self.fsm);
        self.fsm.tick(self.inputs, &mut self.board.sequencer);
    }

    /// Tick until `done` holds or `max_ticks` elapse. Returns whether
    /// `done` was reached.
    pub fn run_until(&mut self, max_ticks: u64, mut done: impl FnMut(&Self) -> bool) -> bool {
        for _ in 0..max_ticks {
            if done(self) {
                return true;
            }
            self.tick();
        }
        done(self)
    }

    /// Tick until the orchestrator enters `phase`.
    pub fn run_to_phase(&mut self, phase: TesterPhase, max_ticks: u64) -> bool {
        self.run_until(max_ticks, |m| m.fsm.phase() == phase)
    }

    pub fn board(&self) -> &Sf3Board {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut Sf3Board {
        &mut self.board
    }

    pub fn fsm(&self) -> &TesterFsm {
        &self.fsm
    }

    pub fn inputs(&self) -> UserInputs {
        self.inputs
    }
}

impl Machine for SfTesterRtl {
    fn run_frame(&mut self, sink: &mut dyn StatusSink) {
        for _ in 0..self.frame_ticks {
            self.tick();
        }
        let lines = status_for(&self.fsm);
        sink.display_line(&lines.line1, &lines.line2);
        sink.log_line(&lines.log_line());
        for (index, color) in leds_for(&self.fsm).into_iter().enumerate() {
            sink.set_led(index, color);
        }
    }

    fn set_input(&mut self, button: u8, pressed: bool) {
        apply_input(&mut self.inputs, button, pressed);
    }

    fn input_map(&self) -> &[InputButton] {
        SF3_INPUT_MAP
    }

    fn run_status(&self) -> RunStatus {
        self.fsm.run_status()
    }

    fn clock(&self) -> u64 {
        self.board.clock()
    }

    fn reset(&mut self) {
        self.board.reset();
        self.fsm.reset();
        self.inputs = UserInputs::default();
    }
}

// ---------------------------------------------------------------------------
// Machine registry
// ---------------------------------------------------------------------------

fn create_machine(config: &BoardConfig) -> Box<dyn Machine> {
    Box::new(SfTesterRtl::new(config))
}

inventory::submit! {
    MachineEntry::new(
        "sf3-rtl",
        "synchronous model, every component clocked every tick",
        create_machine,
    )
}

//! Tester orchestrator: pattern selection, partition bookkeeping and the
//! erase / program / read-verify cycle over one partition per run.

use sftester_core::core::machine::RunStatus;
use sftester_core::device::sf3::{
    DataPort, FlashCommand, FlashGeometry, PAGE_SIZE, PARTITIONS, SUBSECTOR_SIZE, SequencerError,
    Sf3Sequencer,
};

use crate::pattern::{PatternGenerator, TestPattern};

/// Orchestrator state.
///
/// `WaitSelect -> WaitRelease -> SetPattern -> SetStartAddr -> SetStartWait
/// -> EraseSubsectors -> EraseDone -> ProgramPages -> ProgramDone ->
/// ReadPages -> ReadDone -> DisplayFinal -> WaitSelect`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TesterPhase {
    WaitSelect,
    WaitRelease,
    SetPattern,
    SetStartAddr,
    SetStartWait,
    EraseSubsectors,
    EraseDone,
    ProgramPages,
    ProgramDone,
    ReadPages,
    ReadDone,
    DisplayFinal,
}

/// Debounced button and switch levels, bit N = BTNN / SWN.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UserInputs {
    pub buttons: u8,
    pub switches: u8,
}

impl UserInputs {
    /// Pattern chosen by exactly one button, else by exactly one switch.
    pub fn selected_pattern(&self) -> Option<TestPattern> {
        one_hot(self.buttons).or_else(|| one_hot(self.switches))
    }

    pub fn any_button(&self) -> bool {
        self.buttons & 0x0F != 0
    }
}

fn one_hot(lines: u8) -> Option<TestPattern> {
    let lines = lines & 0x0F;
    if lines.count_ones() == 1 {
        TestPattern::from_index(lines.trailing_zeros() as usize)
    } else {
        None
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TesterConfig {
    /// Length of the timed pauses between phases, in orchestrator steps.
    pub dwell_ticks: u32,
    /// Orchestrator steps between status refreshes (firmware board).
    pub refresh_ticks: u32,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            dwell_ticks: 300,
            refresh_ticks: 20,
        }
    }
}

/// Bookkeeping of the current and past runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TestIteration {
    pub selected_pattern: Option<TestPattern>,
    /// Partitions started since reset; the next run tests this index.
    pub partition_index: u32,
    pub starting_address: u32,
    pub subsector_cursor: u32,
    pub page_cursor: u32,
    pub error_count: u32,
    pub test_pass: bool,
    pub test_done: bool,
}

/// A command the sequencer gave up on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommandFailure {
    /// Last command the orchestrator issued; `None` while still booting.
    pub command: Option<FlashCommand>,
    pub error: SequencerError,
}

pub struct TesterFsm {
    config: TesterConfig,
    geometry: FlashGeometry,
    phase: TesterPhase,
    prev_phase: TesterPhase,
    timer: u32,
    iteration: TestIteration,
    program: PatternGenerator,
    verify: PatternGenerator,
    sequencer_errors: u32,
    last_command: Option<FlashCommand>,
    failure: Option<CommandFailure>,
}

impl TesterFsm {
    pub fn new(config: TesterConfig, geometry: FlashGeometry) -> Self {
        let config = TesterConfig {
            dwell_ticks: config.dwell_ticks.max(1),
            refresh_ticks: config.refresh_ticks.max(1),
        };
        Self {
            config,
            geometry,
            phase: TesterPhase::WaitSelect,
            prev_phase: TesterPhase::WaitSelect,
            timer: 0,
            iteration: TestIteration::default(),
            program: TestPattern::A.generator(),
            verify: TestPattern::A.generator(),
            sequencer_errors: 0,
            last_command: None,
            failure: None,
        }
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    pub fn geometry(&self) -> FlashGeometry {
        self.geometry
    }

    pub fn phase(&self) -> TesterPhase {
        self.phase
    }

    pub fn iteration(&self) -> &TestIteration {
        &self.iteration
    }

    /// Steps spent in the current phase, modulo `dwell_ticks`.
    pub fn timer(&self) -> u32 {
        self.timer
    }

    /// Commands the sequencer abandoned on its poll limit.
    pub fn sequencer_errors(&self) -> u32 {
        self.sequencer_errors
    }

    /// Most recent abandoned command not yet reported.
    pub fn take_failure(&mut self) -> Option<CommandFailure> {
        self.failure.take()
    }

    pub fn run_status(&self) -> RunStatus {
        let it = &self.iteration;
        RunStatus {
            waiting_for_selection: self.phase == TesterPhase::WaitSelect,
            partitions_run: it.partition_index,
            starting_address: it.starting_address,
            error_count: it.error_count,
            test_pass: it.test_pass,
            test_done: it.test_done,
        }
    }

    /// One orchestrator step.
    pub fn tick(&mut self, inputs: UserInputs, sequencer: &mut Sf3Sequencer) {
        if let Some(error) = sequencer.take_error() {
            self.sequencer_errors += 1;
            log::warn!("tester: {error} during {:?}", self.phase);
            self.failure = Some(CommandFailure {
                command: self.last_command,
                error,
            });
        }

        self.phase = self.step(inputs, sequencer);

        if self.phase != self.prev_phase {
            log::debug!("tester: {:?} -> {:?}", self.prev_phase, self.phase);
            self.timer = 0;
        } else {
            self.timer = (self.timer + 1) % self.config.dwell_ticks;
        }
        self.prev_phase = self.phase;
    }

    fn step(&mut self, inputs: UserInputs, sequencer: &mut Sf3Sequencer) -> TesterPhase {
        let dwell = self.config.dwell_ticks;
        let it = &mut self.iteration;

        match self.phase {
            TesterPhase::WaitSelect => {
                if it.test_done {
                    return TesterPhase::WaitSelect;
                }
                if it.partition_index >= PARTITIONS {
                    it.test_done = true;
                    return TesterPhase::WaitSelect;
                }
                match inputs.selected_pattern() {
                    Some(pattern) => {
                        it.selected_pattern = Some(pattern);
                        TesterPhase::WaitRelease
                    }
                    None => TesterPhase::WaitSelect,
                }
            }
            TesterPhase::WaitRelease => {
                if inputs.any_button() {
                    TesterPhase::WaitRelease
                } else {
                    TesterPhase::SetPattern
                }
            }
            TesterPhase::SetPattern => {
                let pattern = it.selected_pattern.unwrap_or(TestPattern::A);
                self.program = pattern.generator();
                self.verify = pattern.generator();
                it.error_count = 0;
                TesterPhase::SetStartAddr
            }
            TesterPhase::SetStartAddr => {
                it.subsector_cursor = 0;
                it.page_cursor = 0;
                if it.partition_index >= PARTITIONS {
                    it.test_done = true;
                    return TesterPhase::WaitSelect;
                }
                it.starting_address = self.geometry.partition_start(it.partition_index);
                it.partition_index += 1;
                log::info!(
                    "tester: partition {} at 0x{:08x}, pattern {}",
                    it.partition_index - 1,
                    it.starting_address,
                    it.selected_pattern.map_or('*', TestPattern::letter)
                );
                TesterPhase::SetStartWait
            }
            TesterPhase::SetStartWait => {
                if self.timer == dwell / 2 {
                    TesterPhase::EraseSubsectors
                } else {
                    TesterPhase::SetStartWait
                }
            }
            TesterPhase::EraseSubsectors => {
                if !sequencer.is_idle() {
                    return TesterPhase::EraseSubsectors;
                }
                if it.subsector_cursor >= self.geometry.subsectors_per_partition() {
                    return TesterPhase::EraseDone;
                }
                let address = it.starting_address + it.subsector_cursor * SUBSECTOR_SIZE as u32;
                let erase = FlashCommand::EraseSubsector(address);
                if sequencer.submit(erase) {
                    self.last_command = Some(erase);
                    it.subsector_cursor += 1;
                }
                TesterPhase::EraseSubsectors
            }
            TesterPhase::EraseDone => {
                self.program.restart();
                if self.timer >= dwell - 1 {
                    TesterPhase::ProgramPages
                } else {
                    TesterPhase::EraseDone
                }
            }
            TesterPhase::ProgramPages => {
                if !sequencer.is_idle() {
                    return TesterPhase::ProgramPages;
                }
                if it.page_cursor >= self.geometry.pages_per_partition() {
                    return TesterPhase::ProgramDone;
                }
                let address = it.starting_address + it.page_cursor * PAGE_SIZE as u32;
                let program = FlashCommand::PageProgram(address);
                if sequencer.submit(program) {
                    self.last_command = Some(program);
                    self.program.restart();
                    it.page_cursor += 1;
                }
                TesterPhase::ProgramPages
            }
            TesterPhase::ProgramDone => {
                it.page_cursor = 0;
                if self.timer >= dwell - 1 {
                    TesterPhase::ReadPages
                } else {
                    TesterPhase::ProgramDone
                }
            }
            TesterPhase::ReadPages => {
                if !sequencer.is_idle() {
                    return TesterPhase::ReadPages;
                }
                if it.page_cursor >= self.geometry.pages_per_partition() {
                    return TesterPhase::ReadDone;
                }
                let address = it.starting_address + it.page_cursor * PAGE_SIZE as u32;
                let read = FlashCommand::RandomRead {
                    address,
                    length: PAGE_SIZE,
                };
                if sequencer.submit(read) {
                    self.last_command = Some(read);
                    self.verify.restart();
                    it.page_cursor += 1;
                }
                TesterPhase::ReadPages
            }
            TesterPhase::ReadDone => {
                if self.timer >= dwell - 1 {
                    TesterPhase::DisplayFinal
                } else {
                    TesterPhase::ReadDone
                }
            }
            TesterPhase::DisplayFinal => {
                it.test_pass = it.error_count == 0;
                if self.timer != dwell - 1 {
                    return TesterPhase::DisplayFinal;
                }
                log::info!(
                    "tester: partition at 0x{:08x} {} with {} errors",
                    it.starting_address,
                    if it.test_pass { "passed" } else { "failed" },
                    it.error_count
                );
                if it.partition_index >= PARTITIONS {
                    it.test_done = true;
                    log::info!("tester: all {PARTITIONS} partitions tested");
                }
                TesterPhase::WaitSelect
            }
        }
    }

    /// Back to power-on state; forgets partition progress.
    pub fn reset(&mut self) {
        *self = Self::new(self.config, self.geometry);
    }
}

impl DataPort for TesterFsm {
    fn next_program_byte(&mut self) -> u8 {
        self.program.next_byte()
    }

    fn accept_read_byte(&mut self, byte: u8) {
        if byte != self.verify.next_byte() {
            let limit = self.geometry.total_bytes();
            self.iteration.error_count = (self.iteration.error_count + 1).min(limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fsm(dwell_ticks: u32) -> TesterFsm {
        TesterFsm::new(
            TesterConfig {
                dwell_ticks,
                refresh_ticks: 1,
            },
            FlashGeometry::small(),
        )
    }

    fn press(button: u8) -> UserInputs {
        UserInputs {
            buttons: 1 << button,
            switches: 0,
        }
    }

    #[test]
    fn one_hot_selection() {
        assert_eq!(press(2).selected_pattern(), Some(TestPattern::C));
        let both = UserInputs {
            buttons: 0b0011,
            switches: 0,
        };
        assert_eq!(both.selected_pattern(), None);
        let switch = UserInputs {
            buttons: 0,
            switches: 0b1000,
        };
        assert_eq!(switch.selected_pattern(), Some(TestPattern::D));
        let upper = UserInputs {
            buttons: 0x10,
            switches: 0,
        };
        assert_eq!(upper.selected_pattern(), None);
    }

    #[test]
    fn waits_for_release_before_starting() {
        let mut fsm = fsm(10);
        let mut sequencer = Sf3Sequencer::default();
        fsm.tick(press(1), &mut sequencer);
        assert_eq!(fsm.phase(), TesterPhase::WaitRelease);
        fsm.tick(press(1), &mut sequencer);
        assert_eq!(fsm.phase(), TesterPhase::WaitRelease);
        fsm.tick(UserInputs::default(), &mut sequencer);
        assert_eq!(fsm.phase(), TesterPhase::SetPattern);
        assert_eq!(fsm.iteration().selected_pattern, Some(TestPattern::B));
    }

    #[test]
    fn start_address_advances_per_run() {
        let mut fsm = fsm(10);
        assert_eq!(fsm.geometry(), FlashGeometry::small());
        let mut sequencer = Sf3Sequencer::default();
        fsm.tick(press(0), &mut sequencer);
        fsm.tick(UserInputs::default(), &mut sequencer); // -> SetPattern
        fsm.tick(UserInputs::default(), &mut sequencer); // -> SetStartAddr
        fsm.tick(UserInputs::default(), &mut sequencer); // -> SetStartWait
        assert_eq!(fsm.phase(), TesterPhase::SetStartWait);
        assert_eq!(fsm.iteration().starting_address, 0);
        assert_eq!(fsm.iteration().partition_index, 1);
    }

    #[test]
    fn start_wait_lasts_half_the_dwell() {
        let mut fsm = fsm(10);
        let mut sequencer = Sf3Sequencer::default();
        fsm.tick(press(0), &mut sequencer);
        for _ in 0..3 {
            fsm.tick(UserInputs::default(), &mut sequencer);
        }
        assert_eq!(fsm.timer(), 0);
        let mut steps = 0;
        while fsm.phase() == TesterPhase::SetStartWait {
            fsm.tick(UserInputs::default(), &mut sequencer);
            steps += 1;
        }
        assert_eq!(fsm.timer(), 0);
        assert_eq!(steps, 6);
        assert_eq!(fsm.phase(), TesterPhase::EraseSubsectors);
    }

    #[test]
    fn erase_waits_for_busy_sequencer() {
        let mut fsm = fsm(1);
        // Never ticked, so the sequencer is still in its boot sequence.
        let mut sequencer = Sf3Sequencer::default();
        fsm.tick(press(0), &mut sequencer);
        for _ in 0..20 {
            fsm.tick(UserInputs::default(), &mut sequencer);
        }
        assert_eq!(fsm.phase(), TesterPhase::EraseSubsectors);
        assert_eq!(fsm.iteration().subsector_cursor, 0);
    }

    #[test]
    fn read_compare_counts_every_mismatch() {
        let mut fsm = fsm(1);
        fsm.verify = TestPattern::A.generator();
        for i in 0..256u32 {
            let byte = if i % 2 == 0 { i as u8 } else { 0xFF };
            fsm.accept_read_byte(byte);
        }
        // 0xFF at odd offsets; offset 255 expects 0xFF and matches.
        assert_eq!(fsm.iteration().error_count, 127);
    }

    #[test]
    fn error_count_saturates_at_device_size() {
        let mut fsm = fsm(1);
        fsm.iteration.error_count = FlashGeometry::small().total_bytes();
        fsm.accept_read_byte(0x55);
        assert_eq!(fsm.iteration().error_count, FlashGeometry::small().total_bytes());
    }

    #[test]
    fn done_blocks_selection() {
        let mut fsm = fsm(1);
        let mut sequencer = Sf3Sequencer::default();
        fsm.iteration.partition_index = PARTITIONS;
        fsm.tick(press(0), &mut sequencer);
        assert_eq!(fsm.phase(), TesterPhase::WaitSelect);
        assert!(fsm.iteration().test_done);
        fsm.tick(press(0), &mut sequencer);
        assert_eq!(fsm.phase(), TesterPhase::WaitSelect);
    }
}

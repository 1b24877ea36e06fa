use heapless::Deque;
use sftester_core::core::machine::{InputButton, Machine, RunStatus};
use sftester_core::core::status::{Rgb, StatusSink};

use crate::pmod_sf3::{BoardConfig, SF3_INPUT_MAP, Sf3Board, apply_input};
use crate::registry::MachineEntry;
use crate::status_leds::leds_for;
use crate::status_text::{failure_line, status_for};
use crate::tester_fsm::{TesterFsm, UserInputs};

pub const LED_QUEUE_DEPTH: usize = 10;
pub const CLS_QUEUE_DEPTH: usize = 4;
pub const PRINT_QUEUE_DEPTH: usize = 4;

/// One LED color change for the LED task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedUpdate {
    pub index: u8,
    pub color: Rgb,
}

/// One screen for the LCD task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClsLines {
    pub line1: heapless::String<16>,
    pub line2: heapless::String<16>,
}

pub type PrintLine = heapless::String<40>;

/// Tester built as processor firmware.
///
/// Four cooperative tasks share the board: the tester task, and LED, LCD
/// and print tasks that only consume messages. The tester task runs one
/// orchestrator step per iteration and blocks on the bus (ticking the
/// board) until the command it issued has finished, so at most one flash
/// command is ever in flight and dwell timers count task iterations.
///
/// Messages pass through bounded queues. A send never blocks; when a
/// queue is full the message is dropped and counted. Status text is sent
/// every `refresh_ticks` iterations, LED updates every iteration. A
/// command abandoned on the poll limit also sends a failure line naming it.
pub struct SfTesterMb {
    board: Sf3Board,
    fsm: TesterFsm,
    inputs: UserInputs,

    led_queue: Deque<LedUpdate, LED_QUEUE_DEPTH>,
    cls_queue: Deque<ClsLines, CLS_QUEUE_DEPTH>,
    print_queue: Deque<PrintLine, PRINT_QUEUE_DEPTH>,
    dropped: u32,

    iterations: u64,
}

impl SfTesterMb {
    pub fn new(config: &BoardConfig) -> Self {
        Self {
            board: Sf3Board::new(config),
            fsm: TesterFsm::new(config.tester, config.geometry),
            inputs: UserInputs::default(),
            led_queue: Deque::new(),
            cls_queue: Deque::new(),
            print_queue: Deque::new(),
            dropped: 0,
            iterations: 0,
        }
    }

    /// One iteration of the tester task.
    pub fn tester_step(&mut self) {
        self.board.run_until_idle(&mut self.fsm);
        self.fsm.tick(self.inputs, &mut self.board.sequencer);
        if let Some(failure) = self.fsm.take_failure() {
            self.send_print(&failure_line(&failure));
        }
        self.board.run_until_idle(&mut self.fsm);

        for (index, color) in leds_for(&self.fsm).into_iter().enumerate() {
            let update = LedUpdate {
                index: index as u8,
                color,
            };
            if self.led_queue.push_back(update).is_err() {
                self.dropped += 1;
            }
        }

        if self.iterations % u64::from(self.fsm.config().refresh_ticks) == 0 {
            self.send_status();
        }
        self.iterations += 1;
    }

    fn send_status(&mut self) {
        let lines = status_for(&self.fsm);
        let mut screen = ClsLines {
            line1: heapless::String::new(),
            line2: heapless::String::new(),
        };
        let mut print = PrintLine::new();
        let fits = screen.line1.push_str(&lines.line1).is_ok()
            && screen.line2.push_str(&lines.line2).is_ok()
            && print.push_str(&lines.log_line()).is_ok();
        if !fits {
            log::warn!("mb: status text does not fit its buffers");
            return;
        }
        if self.cls_queue.push_back(screen).is_err() {
            self.dropped += 1;
        }
        if self.print_queue.push_back(print).is_err() {
            self.dropped += 1;
        }
    }

    fn send_print(&mut self, text: &str) {
        let mut line = PrintLine::new();
        if line.push_str(text).is_err() {
            log::warn!("mb: print line does not fit its buffer");
            return;
        }
        if self.print_queue.push_back(line).is_err() {
            self.dropped += 1;
        }
    }

    fn led_task(&mut self, sink: &mut dyn StatusSink) {
        while let Some(update) = self.led_queue.pop_front() {
            sink.set_led(update.index as usize, update.color);
        }
    }

    fn cls_task(&mut self, sink: &mut dyn StatusSink) {
        while let Some(screen) = self.cls_queue.pop_front() {
            sink.display_line(&screen.line1, &screen.line2);
        }
    }

    fn print_task(&mut self, sink: &mut dyn StatusSink) {
        while let Some(line) = self.print_queue.pop_front() {
            sink.log_line(&line);
        }
    }

    /// Messages waiting in the LED, LCD and print queues.
    pub fn queued(&self) -> (usize, usize, usize) {
        (
            self.led_queue.len(),
            self.cls_queue.len(),
            self.print_queue.len(),
        )
    }

    /// Messages lost to full queues since reset.
    pub fn dropped_messages(&self) -> u32 {
        self.dropped
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
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
}

impl Machine for SfTesterMb {
    /// One refresh period: `refresh_ticks` rounds of tester, LED, LCD and
    /// print tasks.
    fn run_frame(&mut self, sink: &mut dyn StatusSink) {
        for _ in 0..self.fsm.config().refresh_ticks {
            self.tester_step();
            self.led_task(sink);
            self.cls_task(sink);
            self.print_task(sink);
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
        self.led_queue.clear();
        self.cls_queue.clear();
        self.print_queue.clear();
        self.dropped = 0;
        self.iterations = 0;
    }
}

// ---------------------------------------------------------------------------
// Machine registry
// ---------------------------------------------------------------------------

fn create_machine(config: &BoardConfig) -> Box<dyn Machine> {
    Box::new(SfTesterMb::new(config))
}

inventory::submit! {
    MachineEntry::new(
        "sf3-mb",
        "firmware model, cooperative tasks with bounded queues",
        create_machine,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_led_queue_drops_updates() {
        let mut machine = SfTesterMb::new(&BoardConfig::small());
        machine.tester_step();
        assert_eq!(machine.queued(), (6, 1, 1));
        machine.tester_step();
        // 12 LED updates offered, 10 fit
        assert_eq!(machine.queued().0, LED_QUEUE_DEPTH);
        assert_eq!(machine.dropped_messages(), 2);
    }

    #[test]
    fn status_text_sent_every_refresh_period() {
        let mut machine = SfTesterMb::new(&BoardConfig::small());
        let refresh = machine.fsm().config().refresh_ticks as usize;
        for _ in 0..refresh {
            machine.tester_step();
            machine.led_queue.clear();
        }
        assert_eq!(machine.queued(), (0, 1, 1));
        machine.tester_step();
        assert_eq!(machine.queued().1, 2);
    }

    #[test]
    fn first_step_waits_out_boot() {
        let mut machine = SfTesterMb::new(&BoardConfig::small());
        machine.tester_step();
        assert!(machine.board().sequencer().is_idle());
        assert!(machine.board().clock() > 0);
        assert_eq!(machine.iterations(), 1);
    }

    #[test]
    fn reset_clears_iterations_and_queues() {
        let mut machine = SfTesterMb::new(&BoardConfig::small());
        machine.tester_step();
        machine.tester_step();
        assert_eq!(machine.iterations(), 2);
        machine.reset();
        assert_eq!(machine.iterations(), 0);
        assert_eq!(machine.queued(), (0, 0, 0));
        assert_eq!(machine.dropped_messages(), 0);
    }
}

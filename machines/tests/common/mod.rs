#![allow(dead_code)]

use sftester_core::core::machine::Machine;
use sftester_core::core::status::{Rgb, StatusDisplay, StatusLeds, StatusLog};
use sftester_machines::pattern::TestPattern;
use sftester_machines::pmod_sf3::{BoardConfig, INPUT_BTN0};
use sftester_machines::sf_tester_rtl::SfTesterRtl;
use sftester_machines::tester_fsm::{TesterConfig, TesterPhase};

pub const MAX_RUN_TICKS: u64 = 200_000_000;

/// Reference timing with short dwell pauses.
pub fn config(small: bool) -> BoardConfig {
    let base = if small {
        BoardConfig::small()
    } else {
        BoardConfig::default()
    };
    BoardConfig {
        tester: TesterConfig {
            dwell_ticks: 16,
            refresh_ticks: 4,
        },
        ..base
    }
}

/// Press and release the pattern's button.
pub fn select(machine: &mut SfTesterRtl, pattern: TestPattern) {
    let button = INPUT_BTN0 + pattern.index() as u8;
    machine.set_input(button, true);
    assert!(
        machine.run_until(1_000, |m| m.fsm().phase() != TesterPhase::WaitSelect),
        "selection not accepted"
    );
    machine.set_input(button, false);
}

/// One complete run: select, then tick until back in `WaitSelect`.
pub fn run_once(machine: &mut SfTesterRtl, pattern: TestPattern) {
    select(machine, pattern);
    assert!(
        machine.run_to_phase(TesterPhase::WaitSelect, MAX_RUN_TICKS),
        "run did not finish"
    );
}

/// Records everything a board reports.
#[derive(Default)]
pub struct RecordingSink {
    pub screens: Vec<(String, String)>,
    pub log: String,
    pub leds: [Rgb; 6],
    pub led_writes: usize,
}

impl StatusDisplay for RecordingSink {
    fn display_line(&mut self, line1: &str, line2: &str) {
        self.screens.push((line1.to_owned(), line2.to_owned()));
    }
}

impl StatusLog for RecordingSink {
    fn log_line(&mut self, text: &str) {
        self.log.push_str(text);
    }
}

impl StatusLeds for RecordingSink {
    fn set_led(&mut self, index: usize, color: Rgb) {
        self.leds[index] = color;
        self.led_writes += 1;
    }
}

use sftester_core::core::status::Rgb;

use crate::pattern::TestPattern;
use crate::tester_fsm::{TesterFsm, TesterPhase};

pub const LED_COUNT: usize = 6;

const WHITE: Rgb = Rgb::new(0x80, 0x80, 0x80);
const AMBER: Rgb = Rgb::new(0x70, 0x10, 0x00);
const CYAN: Rgb = Rgb::new(0x00, 0x80, 0x80);
const RED: Rgb = Rgb::new(0xFF, 0x00, 0x00);
const GREEN: Rgb = Rgb::new(0x00, 100, 0x00);

/// LED colors for the current tester state.
///
/// LED0/LED1 are the RGB LEDs and track the phase: red while waiting for
/// a selection, pattern-coded after one (LED0 green for A, blue for C;
/// LED1 green for B, blue for D). Erasing lights LED0 white, programming
/// LED1 white and reading LED0 cyan; each turns amber once its phase is
/// done. LED1 is cyan on the final result. LED2 shows pass and LED3 shows
/// done; LED4/LED5 stay off.
pub fn led_colors(
    phase: TesterPhase,
    pattern: Option<TestPattern>,
    test_pass: bool,
    test_done: bool,
) -> [Rgb; LED_COUNT] {
    let selected = |p: TestPattern| if pattern == Some(p) { 0xFF } else { 0x00 };
    let (led0, led1) = match phase {
        TesterPhase::WaitSelect => (RED, RED),
        TesterPhase::WaitRelease
        | TesterPhase::SetPattern
        | TesterPhase::SetStartAddr
        | TesterPhase::SetStartWait => (
            Rgb::new(0, selected(TestPattern::A), selected(TestPattern::C)),
            Rgb::new(0, selected(TestPattern::B), selected(TestPattern::D)),
        ),
        TesterPhase::EraseSubsectors => (WHITE, Rgb::OFF),
        TesterPhase::EraseDone => (AMBER, Rgb::OFF),
        TesterPhase::ProgramPages => (Rgb::OFF, WHITE),
        TesterPhase::ProgramDone => (Rgb::OFF, AMBER),
        TesterPhase::ReadPages => (CYAN, Rgb::OFF),
        TesterPhase::ReadDone => (AMBER, Rgb::OFF),
        TesterPhase::DisplayFinal => (Rgb::OFF, CYAN),
    };
    let flag = |on: bool| if on { GREEN } else { Rgb::OFF };
    [led0, led1, flag(test_pass), flag(test_done), Rgb::OFF, Rgb::OFF]
}

pub fn leds_for(fsm: &TesterFsm) -> [Rgb; LED_COUNT] {
    let it = fsm.iteration();
    led_colors(fsm.phase(), it.selected_pattern, it.test_pass, it.test_done)
}

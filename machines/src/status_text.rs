//! Two-line status text for the character LCD and the serial terminal.

use sftester_core::device::sf3::FlashCommand;

use crate::pattern::TestPattern;
use crate::tester_fsm::{CommandFailure, TesterFsm, TesterPhase};

/// Largest error count that fits the 8-digit field.
pub const MAX_DISPLAYED_ERRORS: u32 = 99_999_999;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLines {
    pub line1: String,
    pub line2: String,
}

impl StatusLines {
    /// Terminal form: both lines on one row, CR LF terminated.
    pub fn log_line(&self) -> String {
        format!("{} {}\r\n", self.line1, self.line2)
    }
}

/// Three-character phase code shown on line 2.
pub fn phase_code(phase: TesterPhase) -> &'static str {
    match phase {
        TesterPhase::WaitSelect
        | TesterPhase::WaitRelease
        | TesterPhase::SetPattern
        | TesterPhase::SetStartAddr
        | TesterPhase::SetStartWait => "GO ",
        TesterPhase::EraseSubsectors | TesterPhase::EraseDone => "ERS",
        TesterPhase::ProgramPages | TesterPhase::ProgramDone => "PRO",
        TesterPhase::ReadPages | TesterPhase::ReadDone => "TST",
        TesterPhase::DisplayFinal => "END",
    }
}

/// `"SF3 P<X> h<address>"` / `"<code> ERR <count>"`, 16 characters each.
pub fn format_status(
    pattern: Option<TestPattern>,
    starting_address: u32,
    phase: TesterPhase,
    error_count: u32,
) -> StatusLines {
    let letter = pattern.map_or('*', TestPattern::letter);
    StatusLines {
        line1: format!("SF3 P{letter} h{starting_address:08x}"),
        line2: format!(
            "{} ERR {:08}",
            phase_code(phase),
            error_count.min(MAX_DISPLAYED_ERRORS)
        ),
    }
}

/// Status lines for the orchestrator's current state.
pub fn status_for(fsm: &TesterFsm) -> StatusLines {
    let it = fsm.iteration();
    format_status(it.selected_pattern, it.starting_address, fsm.phase(), it.error_count)
}

/// Terminal line for an abandoned command, CR LF terminated.
pub fn failure_line(failure: &CommandFailure) -> String {
    match failure.command {
        Some(FlashCommand::EraseSubsector(address)) => format!("Ers Fail {address:08x}\r\n"),
        Some(FlashCommand::PageProgram(address)) => format!("PRO Fail {address:08x}\r\n"),
        Some(FlashCommand::RandomRead { address, .. }) => format!("RD  Fail {address:08x}\r\n"),
        _ => "WEN Fail\r\n".to_owned(),
    }
}

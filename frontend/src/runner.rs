use anyhow::{Result, bail};
use sftester_core::core::machine::{Machine, RunStatus};
use sftester_core::core::status::StatusSink;
use sftester_machines::pattern::TestPattern;
use sftester_machines::pmod_sf3::INPUT_BTN0;

/// Run one test per entry of `patterns`, the way an operator would: hold
/// the pattern's button for a frame, release it, and let the board run
/// until it is back to waiting for a selection.
///
/// Stops early once every partition has been tested. `max_frames` bounds
/// each run so a hung chip cannot stall the frontend forever.
pub fn run_patterns(
    machine: &mut dyn Machine,
    patterns: &[TestPattern],
    sink: &mut dyn StatusSink,
    max_frames: u64,
) -> Result<RunStatus> {
    for (run, &pattern) in patterns.iter().enumerate() {
        if machine.run_status().test_done {
            log::warn!(
                "all partitions tested, skipping {} remaining run(s)",
                patterns.len() - run
            );
            break;
        }

        let button = INPUT_BTN0 + pattern.index() as u8;
        machine.set_input(button, true);
        let mut frames = 0;
        while machine.run_status().waiting_for_selection {
            machine.run_frame(sink);
            frames += 1;
            if frames >= max_frames {
                machine.set_input(button, false);
                bail!("pattern {} was never accepted", pattern.letter());
            }
        }
        machine.set_input(button, false);

        while !machine.run_status().waiting_for_selection {
            machine.run_frame(sink);
            frames += 1;
            if frames >= max_frames {
                bail!(
                    "run {} (pattern {}) did not finish within {max_frames} frames",
                    run + 1,
                    pattern.letter()
                );
            }
        }

        let status = machine.run_status();
        log::info!(
            "run {}: pattern {} at 0x{:08x}, {} errors",
            run + 1,
            pattern.letter(),
            status.starting_address,
            status.error_count
        );
    }
    Ok(machine.run_status())
}

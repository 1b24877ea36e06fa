mod common;

use common::{MAX_RUN_TICKS, RecordingSink, config, run_once, select};
use sftester_core::core::machine::Machine;
use sftester_core::device::sf3::{FlashGeometry, PAGE_SIZE, SequencerConfig};
use sftester_machines::pattern::TestPattern;
use sftester_machines::pmod_sf3::{BoardConfig, INPUT_BTN0, INPUT_BTN1, INPUT_SW2};
use sftester_machines::sf_tester_rtl::SfTesterRtl;
use sftester_machines::tester_fsm::{TesterPhase, UserInputs};

// ==========================================================================
// Single runs
// ==========================================================================

#[test]
fn test_fresh_device_pattern_a_passes() {
    let mut machine = SfTesterRtl::new(&config(false));
    run_once(&mut machine, TestPattern::A);

    let status = machine.run_status();
    assert_eq!(status.error_count, 0);
    assert!(status.test_pass);
    assert!(!status.test_done);
    assert_eq!(status.partitions_run, 1);
    assert_eq!(status.starting_address, 0);

    // Every page of the partition holds the pattern restarted at its start.
    let geometry = FlashGeometry::default();
    let memory = machine.board().flash().memory();
    for page in memory[..geometry.partition_bytes() as usize].chunks(PAGE_SIZE) {
        for (offset, &byte) in page.iter().enumerate() {
            assert_eq!(byte, TestPattern::A.byte_at(offset));
        }
    }
    assert_eq!(memory[geometry.partition_bytes() as usize], 0xFF);
}

#[test]
fn test_single_bit_flip_counts_one_error() {
    let mut machine = SfTesterRtl::new(&config(true));
    select(&mut machine, TestPattern::A);
    assert!(machine.run_to_phase(TesterPhase::ProgramDone, MAX_RUN_TICKS));

    machine.board_mut().flash_mut().flip_bit(5 * 256 + 37, 0);

    assert!(machine.run_to_phase(TesterPhase::WaitSelect, MAX_RUN_TICKS));
    let status = machine.run_status();
    assert_eq!(status.error_count, 1);
    assert!(!status.test_pass);
}

#[test]
fn test_error_count_never_decreases_during_verify() {
    let mut machine = SfTesterRtl::new(&config(true));
    select(&mut machine, TestPattern::C);
    assert!(machine.run_to_phase(TesterPhase::ProgramDone, MAX_RUN_TICKS));
    for page in 0..16u32 {
        machine.board_mut().flash_mut().flip_bit(page * 256 + page, 3);
    }

    let mut last = 0;
    while machine.fsm().phase() != TesterPhase::WaitSelect {
        machine.tick();
        let count = machine.fsm().iteration().error_count;
        assert!(count >= last);
        last = count;
    }
    assert_eq!(last, 16);

    // The next run starts from zero and passes.
    run_once(&mut machine, TestPattern::C);
    assert_eq!(machine.run_status().error_count, 0);
    assert!(machine.run_status().test_pass);
}

#[test]
fn test_switch_selects_pattern() {
    let mut machine = SfTesterRtl::new(&config(true));
    machine.set_input(INPUT_SW2, true);
    assert_eq!(machine.inputs().switches, 0b0100);
    assert_eq!(machine.inputs().buttons, 0);
    assert!(machine.run_until(10, |m| m.fsm().phase() == TesterPhase::WaitRelease));
    assert_eq!(machine.fsm().iteration().selected_pattern, Some(TestPattern::C));
}

#[test]
fn test_two_buttons_are_ignored() {
    let mut machine = SfTesterRtl::new(&config(true));
    machine.set_input(INPUT_BTN0, true);
    machine.set_input(INPUT_BTN1, true);
    assert_eq!(machine.inputs().buttons, 0b0011);
    assert!(!machine.run_until(1_000, |m| m.fsm().phase() != TesterPhase::WaitSelect));
}

// ==========================================================================
// Partition progression
// ==========================================================================

#[test]
fn test_pattern_b_over_two_partitions() {
    let mut machine = SfTesterRtl::new(&config(false));
    assert_eq!(machine.run_status().partitions_run, 0);

    run_once(&mut machine, TestPattern::B);
    assert_eq!(machine.run_status().partitions_run, 1);
    assert_eq!(machine.run_status().starting_address, 0);

    run_once(&mut machine, TestPattern::B);
    let status = machine.run_status();
    assert_eq!(status.partitions_run, 2);
    assert_eq!(status.starting_address, 1_048_576);
    assert!(status.test_pass);
    assert!(!status.test_done);
}

#[test]
fn test_all_partitions_then_done() {
    let mut machine = SfTesterRtl::new(&config(true));
    let geometry = FlashGeometry::small();
    for k in 0..32u32 {
        assert!(!machine.run_status().test_done);
        run_once(&mut machine, TestPattern::ALL[k as usize % 4]);
        assert_eq!(machine.run_status().starting_address, geometry.partition_start(k));
    }
    let status = machine.run_status();
    assert!(status.test_done);
    assert!(status.test_pass);
    assert_eq!(status.starting_address, geometry.partition_start(31));

    // Pressing again does nothing.
    machine.set_input(INPUT_BTN0, true);
    assert!(!machine.run_until(10_000, |m| m.fsm().phase() != TesterPhase::WaitSelect));
    machine.set_input(INPUT_BTN0, false);
    machine.run_until(10_000, |_| false);
    assert!(machine.run_status().test_done);
    assert_eq!(machine.run_status().partitions_run, 32);
}

#[test]
fn test_reset_starts_over() {
    let mut machine = SfTesterRtl::new(&config(true));
    run_once(&mut machine, TestPattern::D);
    machine.set_input(INPUT_SW2, true);
    machine.reset();
    assert_eq!(machine.clock(), 0);
    assert_eq!(machine.inputs(), UserInputs::default());
    assert_eq!(machine.run_status().partitions_run, 0);
    // Array contents survive the reset.
    assert_eq!(machine.board().flash().read(0), TestPattern::D.start());
}

// ==========================================================================
// Stuck chip
// ==========================================================================

#[test]
fn test_stuck_chip_hangs_in_phase() {
    let mut machine = SfTesterRtl::new(&config(true));
    select(&mut machine, TestPattern::A);
    assert!(machine.run_to_phase(TesterPhase::EraseSubsectors, MAX_RUN_TICKS));
    machine.board_mut().flash_mut().set_stuck_busy(true);
    machine.run_until(500_000, |_| false);
    assert_eq!(machine.fsm().phase(), TesterPhase::EraseSubsectors);
}

#[test]
fn test_poll_limit_lets_run_finish() {
    let config = BoardConfig {
        sequencer: SequencerConfig {
            boot_status_value: 0,
            poll_limit: Some(8),
        },
        ..config(true)
    };
    let mut machine = SfTesterRtl::new(&config);
    select(&mut machine, TestPattern::A);
    assert!(machine.run_to_phase(TesterPhase::EraseSubsectors, MAX_RUN_TICKS));
    machine.board_mut().flash_mut().set_stuck_busy(true);
    assert!(machine.run_to_phase(TesterPhase::WaitSelect, MAX_RUN_TICKS));

    // Programming never happened, so every byte but the pattern's 0xFF
    // positions mismatches.
    let status = machine.run_status();
    assert!(machine.fsm().sequencer_errors() > 0);
    assert!(!status.test_pass);
    assert_eq!(status.error_count, 16 * 255);
}

// ==========================================================================
// Status reporting
// ==========================================================================

#[test]
fn test_frame_reports_status() {
    let config = BoardConfig {
        frame_ticks: 1_000,
        ..config(true)
    };
    let mut machine = SfTesterRtl::new(&config);
    let mut sink = RecordingSink::default();
    machine.run_frame(&mut sink);
    assert_eq!(machine.clock(), 1_000);
    assert_eq!(
        sink.screens,
        vec![("SF3 P* h00000000".to_owned(), "GO  ERR 00000000".to_owned())]
    );
    assert_eq!(sink.log, "SF3 P* h00000000 GO  ERR 00000000\r\n");
    assert_eq!(sink.led_writes, 6);
    assert_eq!(sink.leds[0].red, 0xFF);
}

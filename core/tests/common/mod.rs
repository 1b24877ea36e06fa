#![allow(dead_code)]

use sftester_core::core::{Component, SpiPeripheral};
use sftester_core::device::n25q::{N25q, N25qTiming};
use sftester_core::device::sf3::{DataPort, FlashGeometry, SequencerConfig, Sf3Sequencer};
use sftester_core::device::spi_master::{SpiMaster, SpiMasterConfig};

/// Framer, sequencer and flash wired together, clocked the way the boards
/// clock them.
pub struct Rig {
    pub master: SpiMaster,
    pub sequencer: Sf3Sequencer,
    pub flash: N25q,
    pub port: TestPort,
    pub clock: u64,
}

impl Rig {
    pub fn new(sequencer: SequencerConfig) -> Self {
        Self::with_spi(SpiMasterConfig::default(), sequencer)
    }

    pub fn with_spi(spi: SpiMasterConfig, sequencer: SequencerConfig) -> Self {
        let timing = N25qTiming {
            erase_busy_ticks: 500,
            program_busy_ticks: 100,
            write_status_busy_ticks: 20,
        };
        Self {
            master: SpiMaster::new(spi),
            sequencer: Sf3Sequencer::new(sequencer),
            flash: N25q::new(FlashGeometry::small(), timing),
            port: TestPort::default(),
            clock: 0,
        }
    }

    /// Booted rig with the default sequencer configuration.
    pub fn booted() -> Self {
        let mut rig = Self::new(SequencerConfig::default());
        assert!(rig.run_until_idle(1_000_000), "boot did not finish");
        rig
    }

    /// One system tick; true when the sequencer finished a command.
    pub fn tick(&mut self) -> bool {
        self.flash.drive(self.master.pins());
        self.flash.tick();
        self.master.set_cipo(self.flash.cipo());
        self.master.tick();
        self.clock += 1;
        self.sequencer.tick(&mut self.master, &mut self.port)
    }

    pub fn run_until_idle(&mut self, max_ticks: u64) -> bool {
        for _ in 0..max_ticks {
            if self.sequencer.is_idle() {
                return true;
            }
            self.tick();
        }
        self.sequencer.is_idle()
    }
}

/// Page data source and read sink for the sequencer.
#[derive(Default)]
pub struct TestPort {
    pub program: Vec<u8>,
    pub program_pos: usize,
    pub received: Vec<u8>,
}

impl TestPort {
    pub fn with_program(data: &[u8]) -> Self {
        Self {
            program: data.to_vec(),
            ..Self::default()
        }
    }
}

impl DataPort for TestPort {
    fn next_program_byte(&mut self) -> u8 {
        let byte = self.program.get(self.program_pos).copied().unwrap_or(0xFF);
        self.program_pos += 1;
        byte
    }

    fn accept_read_byte(&mut self, byte: u8) {
        self.received.push(byte);
    }
}

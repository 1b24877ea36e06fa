pub mod n25q;
pub mod sf3;
pub mod spi_master;

pub use n25q::{N25q, N25qTiming};
pub use sf3::{
    DataPort, DeviceStatus, FlashCommand, FlashGeometry, SequencerConfig, SequencerError,
    Sf3Sequencer,
};
pub use spi_master::{BusTransaction, FramerState, SpiMaster, SpiMasterConfig};

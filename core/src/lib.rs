pub mod core;
pub mod device;

pub mod prelude {
    pub use crate::core::machine::{InputButton, Machine, RunStatus};
    pub use crate::core::status::{Rgb, StatusDisplay, StatusLeds, StatusLog, StatusSink};
    pub use crate::core::{Component, SpiPeripheral, SpiPins};
}

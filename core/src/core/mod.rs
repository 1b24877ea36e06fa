pub mod bus;
pub mod component;
pub mod machine;
pub mod status;

pub use bus::{SpiPeripheral, SpiPins};
pub use component::Component;
pub use machine::{InputButton, Machine, RunStatus};
pub use status::{Rgb, StatusDisplay, StatusLeds, StatusLog, StatusSink};

pub mod pattern;
pub mod pmod_sf3;
pub mod registry;
pub mod sf_tester_mb;
pub mod sf_tester_rtl;
pub mod status_leds;
pub mod status_text;
pub mod tester_fsm;

pub use pattern::{PatternGenerator, TestPattern};
pub use pmod_sf3::{BoardConfig, Sf3Board};
pub use sf_tester_mb::SfTesterMb;
pub use sf_tester_rtl::SfTesterRtl;
pub use tester_fsm::{TestIteration, TesterConfig, TesterFsm, TesterPhase, UserInputs};

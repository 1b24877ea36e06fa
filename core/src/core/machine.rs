use super::status::StatusSink;

/// Describes a single input button or switch that a machine accepts.
pub struct InputButton {
    /// Machine-defined input identifier, passed to `set_input()`.
    pub id: u8,
    /// Human-readable name for display/configuration (e.g., "BTN0", "SW2").
    pub name: &'static str,
}

/// Snapshot of the tester bookkeeping a frontend needs to drive runs and
/// print a summary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStatus {
    /// True while the tester sits in its pattern-selection state.
    pub waiting_for_selection: bool,
    /// Number of partitions started since reset.
    pub partitions_run: u32,
    /// Byte offset of the partition under test (or last tested).
    pub starting_address: u32,
    pub error_count: u32,
    pub test_pass: bool,
    pub test_done: bool,
}

/// Machine-agnostic interface for the emulated tester boards.
///
/// Each board variant (synchronous RTL model, firmware task model)
/// implements this trait so the frontend can drive any of them the same
/// way without knowing about framers, sequencers, or queues.
pub trait Machine {
    /// Run one display-refresh interval of emulation, then report the
    /// status lines, log line and LED colors to `sink`.
    fn run_frame(&mut self, sink: &mut dyn StatusSink);

    /// Handle an input event. `button` is a machine-defined ID from
    /// `input_map()`. `pressed` is true for press / switch on.
    ///
    /// Each call latches the input state so that `run_frame()` sees the
    /// accumulated input.
    fn set_input(&mut self, button: u8, pressed: bool);

    /// Get the list of inputs this machine accepts.
    fn input_map(&self) -> &[InputButton];

    /// Current tester bookkeeping.
    fn run_status(&self) -> RunStatus;

    /// System clock ticks elapsed since reset.
    fn clock(&self) -> u64;

    /// Reset the machine to its initial power-on state.
    fn reset(&mut self);
}

/// Anything that advances by discrete system-clock ticks (bus framer,
/// flash model busy timer).
pub trait Component {
    /// Advance one system clock cycle.
    /// Returns true if a "significant event" occurred (e.g. a bus
    /// transaction finished).
    fn tick(&mut self) -> bool;

    /// Return to the power-on state.
    fn reset(&mut self);
}

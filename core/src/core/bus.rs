/// Logic levels driven by the bus controller onto the serial flash bus.
///
/// Extended SPI uses four data lines on the PMOD connector, but only DQ0
/// (controller out) and DQ1 (controller in) carry data; WP# and HOLD# are
/// held high and are not modeled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpiPins {
    /// Serial clock. Mode 0: idles low, data sampled on the rising edge.
    pub sck: bool,
    /// Chip select, active low.
    pub cs_n: bool,
    /// Controller-out / peripheral-in data line (DQ0).
    pub copi: bool,
}

impl SpiPins {
    /// Bus at rest: clock low, chip deselected, data low.
    pub const IDLE: SpiPins = SpiPins {
        sck: false,
        cs_n: true,
        copi: false,
    };
}

impl Default for SpiPins {
    fn default() -> Self {
        Self::IDLE
    }
}

/// A device hanging off the serial bus (the flash chip side).
///
/// The board calls `drive()` once per system tick with the controller's
/// registered pin outputs; the peripheral detects its own clock and
/// chip-select edges. `cipo()` reports the level it currently drives on
/// the controller-in line.
pub trait SpiPeripheral {
    fn drive(&mut self, pins: SpiPins);

    fn cipo(&self) -> bool;
}

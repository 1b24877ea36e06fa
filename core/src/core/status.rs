//! Narrow interfaces to the status peripherals (character LCD, UART
//! terminal, PWM LEDs). The tester only formats what to show; how it is
//! shown is up to the implementor.

/// Color of one LED as 8-bit PWM duty values per filament.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }
}

/// Two-line character display (16x2 LCD).
pub trait StatusDisplay {
    fn display_line(&mut self, line1: &str, line2: &str);
}

/// Serial terminal. `text` already carries its `"\r\n"` terminator.
pub trait StatusLog {
    fn log_line(&mut self, text: &str);
}

/// Board LEDs, addressed by silkscreen index.
pub trait StatusLeds {
    fn set_led(&mut self, index: usize, color: Rgb);
}

/// Everything a board reports to on each display refresh.
pub trait StatusSink: StatusDisplay + StatusLog + StatusLeds {}

impl<T: StatusDisplay + StatusLog + StatusLeds> StatusSink for T {}

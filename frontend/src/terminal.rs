use std::io::Write;

use sftester_core::core::status::{Rgb, StatusDisplay, StatusLeds, StatusLog};

/// Status peripherals rendered on a text terminal.
///
/// The UART stream goes to `out` verbatim. The LCD and LEDs have no
/// terminal equivalent, so changes to them are logged at debug level.
pub struct TerminalSink<W: Write> {
    out: W,
    lines: (String, String),
    leds: Vec<Rgb>,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            lines: (String::new(), String::new()),
            leds: Vec::new(),
        }
    }

    /// Last two lines shown on the LCD.
    pub fn display(&self) -> (&str, &str) {
        (&self.lines.0, &self.lines.1)
    }

    pub fn led(&self, index: usize) -> Rgb {
        self.leds.get(index).copied().unwrap_or(Rgb::OFF)
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StatusDisplay for TerminalSink<W> {
    fn display_line(&mut self, line1: &str, line2: &str) {
        if self.lines.0 != line1 || self.lines.1 != line2 {
            log::debug!("lcd: [{line1}] [{line2}]");
            self.lines = (line1.to_owned(), line2.to_owned());
        }
    }
}

impl<W: Write> StatusLog for TerminalSink<W> {
    fn log_line(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|()| self.out.flush()) {
            log::error!("uart: write failed: {e}");
        }
    }
}

impl<W: Write> StatusLeds for TerminalSink<W> {
    fn set_led(&mut self, index: usize, color: Rgb) {
        if self.leds.len() <= index {
            self.leds.resize(index + 1, Rgb::OFF);
        }
        if self.leds[index] != color {
            log::debug!(
                "led{index}: #{:02x}{:02x}{:02x}",
                color.red,
                color.green,
                color.blue
            );
            self.leds[index] = color;
        }
    }
}

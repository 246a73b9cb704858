//! 16x2 character display.
//!
//! The kiosk only ever needs "put this text on line N" and "clear", so that is
//! all the trait asks of a panel driver.

use std::io::{self, Write};

pub const LCD_WIDTH: usize = 16;
pub const LCD_LINES: usize = 2;

pub trait Lcd {
    /// Shows `text` on `line` (1 or 2), truncated or space-padded to the width.
    fn display(&mut self, text: &str, line: u8) -> io::Result<()>;
    fn clear(&mut self) -> io::Result<()>;
}

/// Fits `text` to exactly one LCD line.
pub fn fit_line(text: &str) -> String {
    let mut line: String = text.chars().take(LCD_WIDTH).collect();
    let len = line.chars().count();
    line.extend(std::iter::repeat_n(' ', LCD_WIDTH - len));
    line
}

fn line_index(line: u8) -> usize {
    // anything but line 2 lands on the first row, like the panel's DDRAM addressing
    if line == 2 { 1 } else { 0 }
}

/// Draws the panel as a framed box on a terminal.
pub struct ConsoleLcd<W: Write> {
    out: W,
    lines: [String; LCD_LINES],
}

impl<W: Write> ConsoleLcd<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            lines: [fit_line(""), fit_line("")],
        }
    }

    pub fn lines(&self) -> &[String; LCD_LINES] {
        &self.lines
    }

    fn redraw(&mut self) -> io::Result<()> {
        let border = format!("+{}+", "-".repeat(LCD_WIDTH));
        writeln!(self.out, "{border}")?;
        for line in &self.lines {
            writeln!(self.out, "|{line}|")?;
        }
        writeln!(self.out, "{border}")?;
        self.out.flush()
    }
}

impl<W: Write> Lcd for ConsoleLcd<W> {
    fn display(&mut self, text: &str, line: u8) -> io::Result<()> {
        self.lines[line_index(line)] = fit_line(text);
        self.redraw()
    }

    fn clear(&mut self) -> io::Result<()> {
        self.lines = [fit_line(""), fit_line("")];
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_are_fitted() {
        assert_eq!(fit_line("Bank:"), "Bank:           ");
        assert_eq!(fit_line("12345678901234567890"), "1234567890123456");
        assert_eq!(fit_line("").len(), LCD_WIDTH);
    }

    #[test]
    fn console_frame() {
        let mut out = Vec::new();
        {
            let mut lcd = ConsoleLcd::new(&mut out);
            lcd.clear().unwrap();
            lcd.display("Tap your tag", 1).unwrap();
            assert_eq!(lcd.lines()[0], "Tap your tag    ");
            assert_eq!(lcd.lines()[1], " ".repeat(16));
        }
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("|Tap your tag    |"));
        assert!(text.contains("+----------------+"));
    }

    #[test]
    fn unknown_line_falls_back_to_first() {
        let mut lcd = ConsoleLcd::new(io::sink());
        lcd.display("x", 7).unwrap();
        assert_eq!(lcd.lines()[0], fit_line("x"));
    }
}

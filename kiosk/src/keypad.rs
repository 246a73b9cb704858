use std::collections::VecDeque;
use std::io::{self, Read};

pub const BACKSPACE: char = '\u{7f}';
pub const ENTER: char = '\n';

pub trait KeySource {
    /// Next key press, `None` once the keypad is gone.
    fn read_key(&mut self) -> io::Result<Option<char>>;
}

/// Reads key presses from a byte stream such as stdin.
///
/// `\r` is reported as [`ENTER`] and `\x08` as [`BACKSPACE`]; other non-ASCII
/// bytes are skipped.
pub struct StreamKeys<R: Read> {
    input: io::Bytes<R>,
}

impl<R: Read> StreamKeys<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: input.bytes(),
        }
    }
}

impl<R: Read> KeySource for StreamKeys<R> {
    fn read_key(&mut self) -> io::Result<Option<char>> {
        for byte in self.input.by_ref() {
            let key = match byte? {
                b'\r' | b'\n' => ENTER,
                0x08 | 0x7f => BACKSPACE,
                b if b.is_ascii() => char::from(b),
                _ => continue,
            };
            return Ok(Some(key));
        }
        Ok(None)
    }
}

/// Pre-recorded key presses.
#[derive(Debug, Default)]
pub struct ScriptedKeys(VecDeque<char>);

impl ScriptedKeys {
    pub fn new(keys: &str) -> Self {
        Self(keys.chars().collect())
    }
}

impl KeySource for ScriptedKeys {
    fn read_key(&mut self) -> io::Result<Option<char>> {
        Ok(self.0.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_keys_normalize_controls() {
        let mut keys = StreamKeys::new(&b"1\r\x08\xc3a\n"[..]);
        let mut seen = Vec::new();
        while let Some(key) = keys.read_key().unwrap() {
            seen.push(key);
        }
        assert_eq!(seen, vec!['1', ENTER, BACKSPACE, 'a', ENTER]);
    }

    #[test]
    fn scripted_keys_run_dry() {
        let mut keys = ScriptedKeys::new("12");
        assert_eq!(keys.read_key().unwrap(), Some('1'));
        assert_eq!(keys.read_key().unwrap(), Some('2'));
        assert_eq!(keys.read_key().unwrap(), None);
    }
}

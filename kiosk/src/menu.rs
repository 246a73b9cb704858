use std::io;
use std::thread;
use std::time::Duration;

use tagpay_shared::payment::FIELD_MAX_LEN;
use tagpay_shared::{
    BANK_OPTIONS, DecodeError, EncodeError, PaymentRecord, ReadFailure, SessionError, TagDevice,
    TagSession, bank_code,
};
use tracing::{debug, info, warn};

use crate::keypad::{BACKSPACE, ENTER, KeySource};
use crate::lcd::Lcd;

#[derive(Debug, thiserror::Error)]
pub enum KioskError {
    #[error("keypad closed")]
    KeypadClosed,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// The operator menu: save a new payment tag, update the amount on an
/// existing one, or read one back.
pub struct Kiosk<D, L, K> {
    session: TagSession<D>,
    lcd: L,
    keys: K,
    hold: Duration,
}

impl<D: TagDevice, L: Lcd, K: KeySource> Kiosk<D, L, K> {
    pub fn new(session: TagSession<D>, lcd: L, keys: K, hold: Duration) -> Self {
        Self {
            session,
            lcd,
            keys,
            hold,
        }
    }

    pub fn lcd(&self) -> &L {
        &self.lcd
    }

    pub fn into_session(self) -> TagSession<D> {
        self.session
    }

    /// Runs the menu until the operator picks Exit or the keypad goes away.
    pub fn run(&mut self) -> Result<(), KioskError> {
        loop {
            match self.menu() {
                Ok(true) => {}
                Ok(false) => return Ok(()),
                Err(KioskError::KeypadClosed) => {
                    info!("Keypad closed, leaving menu");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn menu(&mut self) -> Result<bool, KioskError> {
        self.show("1.Save 2.Update", "3.Read 4.Exit", false)?;
        match self.single_key(&['1', '2', '3', '4'])? {
            '1' => self.save_info()?,
            '2' => self.update_amount_only()?,
            '3' => self.read_info()?,
            _ => {
                self.show("Exiting...", "", false)?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn show(&mut self, line1: &str, line2: &str, hold: bool) -> Result<(), KioskError> {
        self.lcd.clear()?;
        self.lcd.display(line1, 1)?;
        self.lcd.display(line2, 2)?;
        if hold && !self.hold.is_zero() {
            thread::sleep(self.hold);
        }
        Ok(())
    }

    fn key(&mut self) -> Result<char, KioskError> {
        self.keys.read_key()?.ok_or(KioskError::KeypadClosed)
    }

    fn single_key(&mut self, valid: &[char]) -> Result<char, KioskError> {
        loop {
            let key = self.key()?;
            if valid.contains(&key) {
                return Ok(key);
            }
        }
    }

    /// Collects up to `max_len` digits until Enter, echoing them under `prompt`.
    fn read_digits(&mut self, prompt: &str, max_len: usize) -> Result<String, KioskError> {
        let mut input = String::new();
        loop {
            match self.key()? {
                ENTER => return Ok(input),
                BACKSPACE => {
                    input.pop();
                    self.show(prompt, &input, false)?;
                }
                key if key.is_ascii_digit() => {
                    if input.len() < max_len {
                        input.push(key);
                        self.show(prompt, &input, false)?;
                    }
                }
                _ => {}
            }
        }
    }

    fn string_input(&mut self, prompt: &str) -> Result<String, KioskError> {
        self.show(prompt, "", false)?;
        self.read_digits(prompt, FIELD_MAX_LEN)
    }

    fn select_bank(&mut self) -> Result<&'static str, KioskError> {
        loop {
            for page in BANK_OPTIONS.chunks(4) {
                let cell = |i: usize| {
                    page.get(i)
                        .map(|(key, code)| format!("{key}:{code}"))
                        .unwrap_or_default()
                };
                let line1 = format!("{} {}", cell(0), cell(1));
                let line2 = format!("{} {}", cell(2), cell(3));
                self.show(&line1, &line2, true)?;
            }

            self.show("Select Bank:", "Enter 1~16", false)?;
            let input = self.read_digits("Select Bank:", 2)?;
            if let Some(code) = bank_code(&input) {
                return Ok(code);
            }
            self.show("Invalid Input", "", true)?;
        }
    }

    fn save_info(&mut self) -> Result<(), KioskError> {
        let bank = self.select_bank()?;
        self.show("Bank:", bank, true)?;

        let account = self.string_input("Enter Account:")?;
        self.show("Account:", &account, true)?;

        let amount = self.string_input("Enter Amount:")?;
        self.show("Amount:", &amount, true)?;

        let record = PaymentRecord::new(bank, account, amount);
        debug!("Saving {}", record.to_url());
        self.write(&record)
    }

    fn update_amount_only(&mut self) -> Result<(), KioskError> {
        self.show("Read existing", "tag first", true)?;
        let Some(record) = self.read()? else {
            self.show("No saved data", "", true)?;
            return Ok(());
        };

        self.show("Bank:", &record.bank, true)?;
        self.show("Account:", &record.account, true)?;

        let amount = self.string_input("Enter New Amount:")?;
        self.show("Amount:", &amount, true)?;

        let record = record.with_amount(amount);
        debug!("Updating tag to {}", record.to_url());
        self.write(&record)
    }

    fn read_info(&mut self) -> Result<(), KioskError> {
        if let Some(record) = self.read()? {
            self.show("Bank:", &record.bank, true)?;
            self.show("Account:", &record.account, true)?;
            self.show("Amount:", &record.amount, true)?;
        }
        Ok(())
    }

    fn write(&mut self, record: &PaymentRecord) -> Result<(), KioskError> {
        self.show("Tap your tag", "", false)?;
        match self.session.write_record(record) {
            Ok(report) => {
                if !report.erase_failures.is_empty() {
                    warn!("Stale pages left on tag: {:?}", report.erase_failures);
                }
                self.show("Write Success", "", true)
            }
            Err(err) => {
                warn!("Write failed: {}", err);
                let (line1, line2) = write_failure_lines(&err);
                self.show(line1, &line2, true)
            }
        }
    }

    fn read(&mut self) -> Result<Option<PaymentRecord>, KioskError> {
        self.show("Tap your tag", "", false)?;
        match self.session.read_record() {
            Ok(record) => Ok(Some(record)),
            Err(err) => {
                warn!("Read failed: {}", err);
                self.show("Read Fail", read_failure_line(&err), true)?;
                Ok(None)
            }
        }
    }
}

fn write_failure_lines(err: &SessionError) -> (&'static str, String) {
    match err {
        SessionError::NoTagPresent => ("No tag found", String::new()),
        SessionError::WriteFailedAtBlock { page, .. } => ("Write failed", format!("Page {page}")),
        SessionError::EraseFailedAtBlock { page, .. } => ("Erase failed", format!("Page {page}")),
        SessionError::Encode(EncodeError::EmptyField(field)) => {
            ("Write failed", format!("Empty {field}"))
        }
        SessionError::Encode(EncodeError::RecordTooLarge(_))
        | SessionError::CapacityExceeded { .. } => ("Write failed", "Too long".to_string()),
        _ => ("Write failed", String::new()),
    }
}

fn read_failure_line(err: &SessionError) -> &'static str {
    match err {
        SessionError::NoTagPresent => "No tag found",
        SessionError::Read(ReadFailure::Decode(DecodeError::NoEnvelope)) => "No NDEF start",
        SessionError::Read(ReadFailure::Decode(DecodeError::Truncated { .. })) => "Data truncated",
        SessionError::Read(ReadFailure::Decode(DecodeError::UnrecognizedPayload(_))) => {
            "NDEF Decode Err"
        }
        SessionError::Read(ReadFailure::NothingRead(_)) => "Tag unreadable",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypad::ScriptedKeys;
    use crate::lcd::fit_line;
    use tagpay_shared::{SessionConfig, SimulatedTag};

    /// Remembers every full screen shown.
    #[derive(Default)]
    struct RecordingLcd {
        current: [String; 2],
        screens: Vec<(String, String)>,
    }

    impl Lcd for RecordingLcd {
        fn display(&mut self, text: &str, line: u8) -> io::Result<()> {
            let index = if line == 2 { 1 } else { 0 };
            self.current[index] = fit_line(text).trim_end().to_string();
            if line == 2 {
                self.screens
                    .push((self.current[0].clone(), self.current[1].clone()));
            }
            Ok(())
        }

        fn clear(&mut self) -> io::Result<()> {
            self.current = Default::default();
            Ok(())
        }
    }

    impl RecordingLcd {
        fn saw(&self, line1: &str, line2: &str) -> bool {
            self.screens
                .iter()
                .any(|(a, b)| a == line1 && b == line2)
        }
    }

    fn kiosk(tag: SimulatedTag, keys: &str) -> Kiosk<SimulatedTag, RecordingLcd, ScriptedKeys> {
        let config = SessionConfig {
            max_polls: 2,
            ..SessionConfig::default()
        };
        Kiosk::new(
            TagSession::new(tag, config),
            RecordingLcd::default(),
            ScriptedKeys::new(keys),
            Duration::ZERO,
        )
    }

    fn written_tag(record: &PaymentRecord) -> SimulatedTag {
        let mut session = TagSession::new(SimulatedTag::new(), SessionConfig::default());
        session.write_record(record).unwrap();
        session.into_device()
    }

    #[test]
    fn save_writes_the_tag() {
        let mut kiosk = kiosk(SimulatedTag::new(), "11\n1234567890\n50000\n4");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Bank:", "KB"));
        assert!(kiosk.lcd().saw("Write Success", ""));
        assert!(kiosk.lcd().saw("Exiting...", ""));

        let mut session = kiosk.into_session();
        assert_eq!(
            session.read_record().unwrap(),
            PaymentRecord::new("KB", "1234567890", "50000")
        );
    }

    #[test]
    fn bank_list_pages_through_all_codes() {
        let mut kiosk = kiosk(SimulatedTag::new(), "1");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("1:KB 2:WOORI", "3:SHINHAN 4:HANA"));
        assert!(kiosk.lcd().saw("13:JEJU 14:KAKAO", "15:K BANK 16:SUH"));
        assert!(kiosk.lcd().saw("Select Bank:", "Enter 1~16"));
    }

    #[test]
    fn invalid_bank_is_asked_again() {
        let mut kiosk = kiosk(SimulatedTag::new(), "199\n14\n1\n2\n4");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Invalid Input", ""));
        let mut session = kiosk.into_session();
        assert_eq!(session.read_record().unwrap().bank, "KAKAO");
    }

    #[test]
    fn digit_entry_handles_backspace_and_cap() {
        let keys = format!("1{}{}{}4", "3\n", "12\u{7f}3x\n", "12345678901234567\n");
        let mut kiosk = kiosk(SimulatedTag::new(), &keys);
        kiosk.run().unwrap();
        let mut session = kiosk.into_session();
        assert_eq!(
            session.read_record().unwrap(),
            PaymentRecord::new("SHINHAN", "13", "1234567890123456")
        );
    }

    #[test]
    fn read_shows_each_field() {
        let record = PaymentRecord::new("KB", "1234567890", "50000");
        let mut kiosk = kiosk(written_tag(&record), "34");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Bank:", "KB"));
        assert!(kiosk.lcd().saw("Account:", "1234567890"));
        assert!(kiosk.lcd().saw("Amount:", "50000"));
    }

    #[test]
    fn update_changes_only_the_amount() {
        let record = PaymentRecord::new("NH", "0001234", "100");
        let mut kiosk = kiosk(written_tag(&record), "2700\n4");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Account:", "0001234"));
        assert!(kiosk.lcd().saw("Write Success", ""));
        let mut session = kiosk.into_session();
        assert_eq!(
            session.read_record().unwrap(),
            PaymentRecord::new("NH", "0001234", "700")
        );
    }

    #[test]
    fn update_without_saved_data() {
        let mut kiosk = kiosk(SimulatedTag::new(), "24");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Read Fail", "NDEF Decode Err"));
        assert!(kiosk.lcd().saw("No saved data", ""));
        assert!(kiosk.into_session().device().written_pages().is_empty());
    }

    #[test]
    fn missing_tag_is_reported() {
        let mut kiosk = kiosk(SimulatedTag::absent(), "34");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Tap your tag", ""));
        assert!(kiosk.lcd().saw("Read Fail", "No tag found"));
    }

    #[test]
    fn failed_page_is_reported() {
        let tag = SimulatedTag::new().failing_write_at(6);
        let mut kiosk = kiosk(tag, "15\n1\n2\n4");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Write failed", "Page 6"));
    }

    #[test]
    fn empty_account_is_not_written() {
        let mut kiosk = kiosk(SimulatedTag::new(), "15\n\n2\n4");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Write failed", "Empty account"));
        assert!(kiosk.into_session().device().written_pages().is_empty());
    }

    #[test]
    fn blank_tag_read() {
        let mut kiosk = kiosk(SimulatedTag::zeroed(), "34");
        kiosk.run().unwrap();
        assert!(kiosk.lcd().saw("Read Fail", "No NDEF start"));
    }
}

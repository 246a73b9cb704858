use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::ndef::{self, DecodeError, EncodeError, PAGE_SIZE, Page};
use crate::payment::PaymentRecord;
use crate::settings::{EraseMode, SessionConfig};

const ZERO_PAGE: Page = [0u8; PAGE_SIZE];

/// UID reported by the reader for the tag in the field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TagUid(pub Vec<u8>);

impl fmt::Display for TagUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl Serialize for TagUid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("tag did not acknowledge page {0}")]
    Nack(u8),
    #[error("page {0} is outside the tag memory")]
    OutOfRange(u8),
    #[error("tag left the field")]
    TagLost,
    #[error("reader i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// The tag reader/writer as seen by a [`TagSession`].
///
/// Pages are the 4-byte units of NTAG memory. Implementations block for at
/// most `timeout` in `detect_tag`.
pub trait TagDevice {
    fn detect_tag(&mut self, timeout: Duration) -> Result<Option<TagUid>, DeviceError>;
    fn read_page(&mut self, page: u8) -> Result<Page, DeviceError>;
    fn write_page(&mut self, page: u8, data: &Page) -> Result<(), DeviceError>;
}

impl<T: TagDevice + ?Sized> TagDevice for Box<T> {
    fn detect_tag(&mut self, timeout: Duration) -> Result<Option<TagUid>, DeviceError> {
        (**self).detect_tag(timeout)
    }

    fn read_page(&mut self, page: u8) -> Result<Page, DeviceError> {
        (**self).read_page(page)
    }

    fn write_page(&mut self, page: u8, data: &Page) -> Result<(), DeviceError> {
        (**self).write_page(page, data)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadFailure {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("first data page could not be read")]
    NothingRead(#[source] DeviceError),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no tag present")]
    NoTagPresent,
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("record needs {needed} pages, only {available} available")]
    CapacityExceeded { needed: usize, available: usize },
    #[error("write failed at page {page}")]
    WriteFailedAtBlock {
        page: u8,
        #[source]
        source: DeviceError,
    },
    #[error("erasing stale data failed at page {page}")]
    EraseFailedAtBlock {
        page: u8,
        #[source]
        source: DeviceError,
    },
    #[error(transparent)]
    Read(#[from] ReadFailure),
}

impl From<DecodeError> for SessionError {
    fn from(v: DecodeError) -> Self {
        SessionError::Read(ReadFailure::Decode(v))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingTag,
    Absent,
    Present,
    Transferring,
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagHandle {
    pub uid: TagUid,
    /// Polls it took to see the tag, 1-based.
    pub polls: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub uid: TagUid,
    pub first_page: u8,
    pub pages_written: usize,
    pub pages_cleared: usize,
    /// Stale pages that could not be zeroed (best-effort erase only).
    pub erase_failures: Vec<u8>,
}

/// Drives payment record transfers against one tag reader.
///
/// Every operation starts by waiting for a tag, then runs to completion or to
/// the first failing page. Nothing is retried except presence detection.
pub struct TagSession<D> {
    device: D,
    config: SessionConfig,
    state: SessionState,
    last_uid: Option<TagUid>,
}

impl<D: TagDevice> TagSession<D> {
    pub fn new(device: D, config: SessionConfig) -> Self {
        Self {
            device,
            config,
            state: SessionState::Idle,
            last_uid: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// UID of the most recently detected tag.
    pub fn last_uid(&self) -> Option<&TagUid> {
        self.last_uid.as_ref()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn fail<T>(&mut self, err: SessionError) -> Result<T, SessionError> {
        self.transition(SessionState::Failed);
        Err(err)
    }

    /// Polls for a tag up to `max_polls` times, each poll waiting at most
    /// `poll_interval`. A poll that errors counts as an empty one.
    pub fn await_tag(&mut self, poll_interval: Duration, max_polls: u32) -> Option<TagHandle> {
        self.transition(SessionState::AwaitingTag);
        for poll in 1..=max_polls {
            match self.device.detect_tag(poll_interval) {
                Ok(Some(uid)) => {
                    info!("Tag {} detected after {} poll(s)", uid, poll);
                    self.last_uid = Some(uid.clone());
                    self.transition(SessionState::Present);
                    return Some(TagHandle { uid, polls: poll });
                }
                Ok(None) => {}
                Err(err) => debug!("Tag detection poll {} failed: {}", poll, err),
            }
        }
        info!("No tag after {} poll(s)", max_polls);
        self.transition(SessionState::Absent);
        None
    }

    fn present(&mut self) -> Result<TagHandle, SessionError> {
        self.transition(SessionState::Idle);
        let (interval, polls) = (self.config.poll_interval, self.config.max_polls);
        self.await_tag(interval, polls).ok_or(SessionError::NoTagPresent)
    }

    /// Writes `record` from page 4 on, then zeroes the remaining pages up to
    /// the configured bound so a shorter record doesn't leave stale bytes.
    ///
    /// A failed page aborts the write; pages already written stay written.
    pub fn write_record(&mut self, record: &PaymentRecord) -> Result<WriteReport, SessionError> {
        let handle = self.present()?;
        let stream = match ndef::encode(record) {
            Ok(stream) => stream,
            Err(err) => return self.fail(err.into()),
        };
        let available = self.config.data_pages();
        if stream.len() > available {
            return self.fail(SessionError::CapacityExceeded {
                needed: stream.len(),
                available,
            });
        }

        self.transition(SessionState::Transferring);
        let first_page = self.config.first_page;
        let mut page = first_page;
        for data in stream.pages() {
            if let Err(source) = self.device.write_page(page, data) {
                warn!("Write failed at page {}: {}", page, source);
                return self.fail(SessionError::WriteFailedAtBlock { page, source });
            }
            page += 1;
        }
        let pages_written = stream.len();

        let mut report = WriteReport {
            uid: handle.uid,
            first_page,
            pages_written,
            pages_cleared: 0,
            erase_failures: Vec::new(),
        };
        for stale in page..self.config.end_page {
            match self.device.write_page(stale, &ZERO_PAGE) {
                Ok(()) => report.pages_cleared += 1,
                Err(source) => match self.config.erase_mode {
                    EraseMode::BestEffort => {
                        warn!("Could not zero stale page {}: {}", stale, source);
                        report.erase_failures.push(stale);
                    }
                    EraseMode::Strict => {
                        warn!("Erase failed at page {}: {}", stale, source);
                        return self.fail(SessionError::EraseFailedAtBlock {
                            page: stale,
                            source,
                        });
                    }
                },
            }
        }

        info!(
            "Wrote {} page(s) to tag {}, cleared {}",
            pages_written, report.uid, report.pages_cleared
        );
        self.transition(SessionState::Success);
        Ok(report)
    }

    /// Reads pages from page 4 on until the envelope is complete, a page can't
    /// be read (end of data) or the configured bound is hit, then decodes them.
    pub fn read_record(&mut self) -> Result<PaymentRecord, SessionError> {
        self.present()?;
        self.transition(SessionState::Transferring);

        let mut data = Vec::with_capacity(self.config.data_pages() * PAGE_SIZE);
        for page in self.config.first_page..self.config.end_page {
            match self.device.read_page(page) {
                Ok(bytes) => data.extend_from_slice(&bytes),
                Err(err) if data.is_empty() => {
                    warn!("First data page {} unreadable: {}", page, err);
                    return self.fail(ReadFailure::NothingRead(err).into());
                }
                Err(err) => {
                    debug!("Page {} unreadable, treating as end of data: {}", page, err);
                    break;
                }
            }
            if ndef::envelope_end(&data).is_some_and(|end| data.len() >= end) {
                break;
            }
        }

        match ndef::decode(&data) {
            Ok(record) => {
                info!("Read {} byte(s) from tag", data.len());
                debug!("Decoded {:?}", record);
                self.transition(SessionState::Success);
                Ok(record)
            }
            Err(err) => {
                warn!("Could not decode tag data: {}", err);
                self.fail(err.into())
            }
        }
    }

    /// Reads the record on the tag, swaps in `amount` and writes it back.
    pub fn update_amount(
        &mut self,
        amount: &str,
    ) -> Result<(PaymentRecord, WriteReport), SessionError> {
        let current = self.read_record()?;
        let updated = current.with_amount(amount);
        let report = self.write_record(&updated)?;
        Ok((updated, report))
    }
}

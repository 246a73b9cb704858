//! In-memory NTAG213 standing in for a physical reader.
//!
//! Pages 0-2 hold the UID and lock bytes and are read-only, page 3 is the
//! capability container. A fresh tag carries an empty NDEF TLV on page 4,
//! like a factory-formatted one. Optionally the memory image is mirrored to a
//! file after every write so it survives restarts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ndef::{PAGE_SIZE, Page};
use crate::nfc::{DeviceError, TagDevice, TagUid};
use crate::settings::FIRST_DATA_PAGE;

pub const NTAG213_PAGES: usize = 45;
/// CC for NTAG213: NDEF magic, version 1.0, 144 data bytes, read/write.
const NTAG213_CC: Page = [0xE1, 0x10, 0x12, 0x00];
const EMPTY_NDEF_TLV: Page = [0x03, 0x00, 0xFE, 0x00];
const DEFAULT_UID: [u8; 7] = [0x04, 0x5A, 0x13, 0x72, 0xB1, 0x6C, 0x80];

pub struct SimulatedTag {
    memory: Vec<Page>,
    uid: TagUid,
    present: bool,
    /// Detection polls that report nothing before the tag shows up.
    absent_polls: u32,
    fail_write_at: Option<u8>,
    unreadable_from: Option<u8>,
    backing_file: Option<PathBuf>,
    detect_calls: u32,
    written: Vec<u8>,
    read: Vec<u8>,
}

impl Default for SimulatedTag {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTag {
    pub fn new() -> Self {
        let mut tag = Self::zeroed();
        tag.memory[usize::from(FIRST_DATA_PAGE)] = EMPTY_NDEF_TLV;
        tag
    }

    /// Formatted tag with every user page zero.
    pub fn zeroed() -> Self {
        let mut memory = vec![[0u8; PAGE_SIZE]; NTAG213_PAGES];
        memory[0][..3].copy_from_slice(&DEFAULT_UID[..3]);
        memory[1].copy_from_slice(&DEFAULT_UID[3..]);
        memory[3] = NTAG213_CC;
        Self::from_pages(memory)
    }

    /// Reader with nothing in the field.
    pub fn absent() -> Self {
        let mut tag = Self::new();
        tag.present = false;
        tag
    }

    /// Loads a raw memory image (page 0 first, 4 bytes per page).
    pub fn from_image(image: &[u8]) -> io::Result<Self> {
        if image.len() % PAGE_SIZE != 0 || image.len() / PAGE_SIZE <= usize::from(FIRST_DATA_PAGE)
        {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} bytes is not a valid tag image", image.len()),
            ));
        }
        let memory = image
            .chunks_exact(PAGE_SIZE)
            .map(|chunk| {
                let mut page = [0u8; PAGE_SIZE];
                page.copy_from_slice(chunk);
                page
            })
            .collect();
        Ok(Self::from_pages(memory))
    }

    /// Opens the image at `path`, starting from a fresh tag if the file
    /// doesn't exist yet. Writes are mirrored back to the file.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut tag = match fs::read(path) {
            Ok(image) => Self::from_image(&image)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::info!("No tag image at {}, starting blank", path.display());
                Self::new()
            }
            Err(err) => return Err(err),
        };
        tag.backing_file = Some(path.to_path_buf());
        Ok(tag)
    }

    fn from_pages(memory: Vec<Page>) -> Self {
        let uid = TagUid(
            memory[0][..3]
                .iter()
                .chain(memory[1].iter())
                .copied()
                .collect(),
        );
        Self {
            memory,
            uid,
            present: true,
            absent_polls: 0,
            fail_write_at: None,
            unreadable_from: None,
            backing_file: None,
            detect_calls: 0,
            written: Vec::new(),
            read: Vec::new(),
        }
    }

    pub fn appearing_after(mut self, polls: u32) -> Self {
        self.absent_polls = polls;
        self
    }

    pub fn failing_write_at(mut self, page: u8) -> Self {
        self.fail_write_at = Some(page);
        self
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    /// Pages from `page` on fail to read.
    pub fn set_unreadable_from(&mut self, page: Option<u8>) {
        self.unreadable_from = page;
    }

    pub fn uid(&self) -> &TagUid {
        &self.uid
    }

    pub fn page(&self, page: u8) -> Page {
        self.memory[usize::from(page)]
    }

    pub fn image(&self) -> Vec<u8> {
        self.memory.concat()
    }

    pub fn detect_calls(&self) -> u32 {
        self.detect_calls
    }

    /// Pages successfully written, in order.
    pub fn written_pages(&self) -> &[u8] {
        &self.written
    }

    /// Pages successfully read, in order.
    pub fn read_pages(&self) -> &[u8] {
        &self.read
    }

    pub fn reset_counters(&mut self) {
        self.detect_calls = 0;
        self.written.clear();
        self.read.clear();
    }

    fn check_range(&self, page: u8) -> Result<usize, DeviceError> {
        let index = usize::from(page);
        if index < self.memory.len() {
            Ok(index)
        } else {
            Err(DeviceError::OutOfRange(page))
        }
    }

    fn persist(&self) -> Result<(), DeviceError> {
        if let Some(path) = &self.backing_file {
            fs::write(path, self.image())?;
        }
        Ok(())
    }
}

impl TagDevice for SimulatedTag {
    fn detect_tag(&mut self, _timeout: Duration) -> Result<Option<TagUid>, DeviceError> {
        self.detect_calls += 1;
        if !self.present {
            return Ok(None);
        }
        if self.absent_polls > 0 {
            self.absent_polls -= 1;
            return Ok(None);
        }
        Ok(Some(self.uid.clone()))
    }

    fn read_page(&mut self, page: u8) -> Result<Page, DeviceError> {
        if !self.present {
            return Err(DeviceError::TagLost);
        }
        let index = self.check_range(page)?;
        if self.unreadable_from.is_some_and(|from| page >= from) {
            return Err(DeviceError::Nack(page));
        }
        self.read.push(page);
        Ok(self.memory[index])
    }

    fn write_page(&mut self, page: u8, data: &Page) -> Result<(), DeviceError> {
        if !self.present {
            return Err(DeviceError::TagLost);
        }
        let index = self.check_range(page)?;
        // UID and lock pages are factory-locked, page 3 is OTP
        if page < FIRST_DATA_PAGE || self.fail_write_at == Some(page) {
            return Err(DeviceError::Nack(page));
        }
        let previous = std::mem::replace(&mut self.memory[index], *data);
        if let Err(err) = self.persist() {
            self.memory[index] = previous;
            return Err(err);
        }
        self.written.push(page);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tag_layout() {
        let tag = SimulatedTag::new();
        assert_eq!(tag.page(3), NTAG213_CC);
        assert_eq!(tag.page(4), EMPTY_NDEF_TLV);
        assert_eq!(tag.uid().0, DEFAULT_UID.to_vec());
        assert_eq!(tag.image().len(), NTAG213_PAGES * PAGE_SIZE);
    }

    #[test]
    fn header_pages_reject_writes() {
        let mut tag = SimulatedTag::new();
        for page in 0..FIRST_DATA_PAGE {
            assert!(matches!(
                tag.write_page(page, &[1, 2, 3, 4]),
                Err(DeviceError::Nack(p)) if p == page
            ));
        }
        assert!(matches!(
            tag.write_page(45, &[0; 4]),
            Err(DeviceError::OutOfRange(45))
        ));
    }

    #[test]
    fn removed_tag_fails_io() {
        let mut tag = SimulatedTag::new();
        tag.set_present(false);
        assert!(matches!(tag.read_page(4), Err(DeviceError::TagLost)));
        assert_eq!(tag.detect_tag(Duration::ZERO).unwrap(), None);
    }

    #[test]
    fn image_round_trip() {
        let mut tag = SimulatedTag::new();
        tag.write_page(10, &[9, 8, 7, 6]).unwrap();
        let copy = SimulatedTag::from_image(&tag.image()).unwrap();
        assert_eq!(copy.page(10), [9, 8, 7, 6]);
        assert_eq!(copy.uid(), tag.uid());
        assert!(SimulatedTag::from_image(&[0; 10]).is_err());
        assert!(SimulatedTag::from_image(&[0; 16]).is_err());
    }

    #[test]
    fn backing_file_mirrors_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tag.bin");

        let mut tag = SimulatedTag::open(&path).unwrap();
        tag.write_page(5, &[1, 1, 1, 1]).unwrap();

        let reopened = SimulatedTag::open(&path).unwrap();
        assert_eq!(reopened.page(5), [1, 1, 1, 1]);
        assert_eq!(reopened.page(4), EMPTY_NDEF_TLV);
    }

    #[test]
    fn failed_persist_leaves_page_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("tag.bin");

        let mut tag = SimulatedTag::open(&path).unwrap();
        assert!(matches!(
            tag.write_page(5, &[1, 1, 1, 1]),
            Err(DeviceError::Io(_))
        ));
        assert_eq!(tag.page(5), [0; PAGE_SIZE]);
        assert!(tag.written_pages().is_empty());
    }
}

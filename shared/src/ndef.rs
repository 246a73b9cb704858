//! Payment record <-> NTAG page layout.
//!
//! A payment is stored as a single NDEF URI record inside an NDEF message TLV:
//!
//! ```text
//! page 4..: 0x03 <len> <record bytes...> 0xFE 00..  (zero padded to a page)
//! ```
//!
//! The record header is laid out with deku; the TLV framing and page split are
//! done by hand since the tag format only ever uses the one-byte length form.

use deku::prelude::*;

use crate::payment::PaymentRecord;
use crate::settings::FIRST_DATA_PAGE;

pub const PAGE_SIZE: usize = 4;
pub type Page = [u8; PAGE_SIZE];

pub const TLV_NDEF_MESSAGE: u8 = 0x03;
pub const TLV_TERMINATOR: u8 = 0xFE;
/// Single-byte TLV length, so the record itself can't exceed this.
pub const MAX_RECORD_LEN: usize = 255;

const URI_RECORD_TYPE: &[u8] = b"U";
/// Identifier code for "no abbreviation": the full URL follows.
const URI_IDENTIFIER_NONE: u8 = 0x00;

/// NFC Forum URI record identifier codes 0x00..=0x23.
const URI_PREFIXES: [&str; 36] = [
    "",
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{0} is empty")]
    EmptyField(&'static str),
    #[error("NDEF record is {0} bytes, at most {MAX_RECORD_LEN} fit a short TLV")]
    RecordTooLarge(usize),
    #[error("failed to serialize NDEF record: {0}")]
    Serialize(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no TLV envelope found")]
    NoEnvelope,
    #[error("truncated envelope: {declared} bytes declared, {available} available")]
    Truncated { declared: usize, available: usize },
    #[error("unrecognized NDEF payload: {0}")]
    UnrecognizedPayload(String),
}

///////////////////////////////////////////////////////////////////////////////////////

#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(id_type = "u8", bits = 3)]
pub enum TypeNameFormat {
    #[deku(id = 0)]
    Empty,
    #[deku(id = 1)]
    WellKnown,
    #[deku(id = 2)]
    MimeMediaType,
    #[deku(id = 3)]
    AbsoluteUri,
    #[deku(id = 4)]
    External,
    #[deku(id = 5)]
    Unknown,
    #[deku(id = 6)]
    Unchanged,
    #[deku(id = 7)]
    Reserved,
}

/// One NDEF record. Short and long payload lengths and the optional ID field
/// are all understood on read; [`Record::uri`] always produces a short record.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
pub struct Record {
    #[deku(bits = 1)]
    message_begin: bool,
    #[deku(bits = 1)]
    message_end: bool,
    #[deku(bits = 1)]
    chunk_flag: bool,
    #[deku(bits = 1)]
    short_record: bool,
    #[deku(bits = 1)]
    id_length_present: bool,
    type_name_format: TypeNameFormat,
    type_length: u8,
    #[deku(cond = "*short_record")]
    short_payload_length: Option<u8>,
    #[deku(cond = "!*short_record", endian = "big")]
    long_payload_length: Option<u32>,
    #[deku(cond = "*id_length_present")]
    id_length: Option<u8>,
    #[deku(count = "type_length")]
    type_data: Vec<u8>,
    #[deku(count = "id_length.unwrap_or(0)")]
    id_data: Vec<u8>,
    #[deku(count = "short_payload_length.map(u32::from).or(*long_payload_length).unwrap_or(0)")]
    payload_data: Vec<u8>,
}

impl Record {
    /// Well-known URI record carrying the full URL (identifier code 0x00).
    pub fn uri(url: &str) -> Self {
        let mut payload = Vec::with_capacity(1 + url.len());
        payload.push(URI_IDENTIFIER_NONE);
        payload.extend_from_slice(url.as_bytes());

        let short_record = payload.len() <= usize::from(u8::MAX);
        let (short_payload_length, long_payload_length) = if short_record {
            (Some(payload.len() as u8), None)
        } else {
            (None, Some(payload.len() as u32))
        };
        Record {
            message_begin: true,
            message_end: true,
            chunk_flag: false,
            short_record,
            id_length_present: false,
            type_name_format: TypeNameFormat::WellKnown,
            type_length: URI_RECORD_TYPE.len() as u8,
            short_payload_length,
            long_payload_length,
            id_length: None,
            type_data: URI_RECORD_TYPE.to_vec(),
            id_data: Vec::new(),
            payload_data: payload,
        }
    }

    pub fn type_name_format(&self) -> TypeNameFormat {
        self.type_name_format
    }

    pub fn record_type(&self) -> &[u8] {
        &self.type_data
    }

    pub fn is_uri(&self) -> bool {
        self.type_name_format() == TypeNameFormat::WellKnown
            && self.record_type() == URI_RECORD_TYPE
    }

    /// The URL of a well-known URI record, with its identifier code expanded.
    pub fn uri_payload(&self) -> Result<String, DecodeError> {
        if self.chunk_flag {
            return Err(DecodeError::UnrecognizedPayload(
                "chunked records are not supported".into(),
            ));
        }
        if !self.is_uri() {
            return Err(DecodeError::UnrecognizedPayload(format!(
                "expected a well-known URI record, found {:?} type {:02X?}",
                self.type_name_format, self.type_data
            )));
        }
        let Some((&code, rest)) = self.payload_data.split_first() else {
            return Err(DecodeError::UnrecognizedPayload(
                "URI record has an empty payload".into(),
            ));
        };
        let prefix = URI_PREFIXES.get(usize::from(code)).copied().unwrap_or("");
        let rest = core::str::from_utf8(rest).map_err(|e| {
            DecodeError::UnrecognizedPayload(format!("URI is not valid UTF-8: {e}"))
        })?;
        Ok(format!("{prefix}{rest}"))
    }
}

///////////////////////////////////////////////////////////////////////////////////////

/// NDEF message TLV as written to the tag.
#[derive(Debug, PartialEq, Eq, DekuWrite)]
pub struct TlvEnvelope {
    tag: u8,
    length: u8,
    value: Vec<u8>,
    terminator: u8,
}

impl TlvEnvelope {
    pub fn new(value: Vec<u8>) -> Result<Self, EncodeError> {
        let length =
            u8::try_from(value.len()).map_err(|_| EncodeError::RecordTooLarge(value.len()))?;
        Ok(Self {
            tag: TLV_NDEF_MESSAGE,
            length,
            value,
            terminator: TLV_TERMINATOR,
        })
    }
}

/// Pages ready to be written one after another starting at `first_page`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageStream {
    first_page: u8,
    pages: Vec<Page>,
}

impl PageStream {
    /// Splits `bytes` into pages, zero-padding the last one.
    pub fn from_bytes(first_page: u8, bytes: &[u8]) -> Self {
        let pages = bytes
            .chunks(PAGE_SIZE)
            .map(|chunk| {
                let mut page = [0u8; PAGE_SIZE];
                page[..chunk.len()].copy_from_slice(chunk);
                page
            })
            .collect();
        Self { first_page, pages }
    }

    pub fn first_page(&self) -> u8 {
        self.first_page
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Page right after the last one of the stream.
    pub fn end_page(&self) -> usize {
        usize::from(self.first_page) + self.pages.len()
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// `(page index, page data)` in write order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Page)> + '_ {
        let first = usize::from(self.first_page);
        self.pages.iter().enumerate().map(move |(i, page)| (first + i, page))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.pages.concat()
    }
}

/// Encodes a payment record as the pages to write from page 4 on.
pub fn encode(record: &PaymentRecord) -> Result<PageStream, EncodeError> {
    if let Some(field) = record.first_empty_field() {
        return Err(EncodeError::EmptyField(field));
    }
    let url = record.to_url();
    let record_bytes = Record::uri(&url)
        .to_bytes()
        .map_err(|e| EncodeError::Serialize(e.to_string()))?;
    if record_bytes.len() > MAX_RECORD_LEN {
        return Err(EncodeError::RecordTooLarge(record_bytes.len()));
    }
    let envelope = TlvEnvelope::new(record_bytes)?
        .to_bytes()
        .map_err(|e| EncodeError::Serialize(e.to_string()))?;
    tracing::trace!("Encoded {} as {} TLV bytes", url, envelope.len());
    Ok(PageStream::from_bytes(FIRST_DATA_PAGE, &envelope))
}

/// Returns the NDEF message bytes of the first TLV starting with 0x03.
///
/// The declared length is trusted; whatever follows it, terminator included,
/// is ignored.
pub fn find_envelope(data: &[u8]) -> Result<&[u8], DecodeError> {
    let start = data
        .iter()
        .position(|&b| b == TLV_NDEF_MESSAGE)
        .ok_or(DecodeError::NoEnvelope)?;
    let value_start = start + 2;
    let Some(&length) = data.get(start + 1) else {
        return Err(DecodeError::Truncated {
            declared: 0,
            available: 0,
        });
    };
    let declared = usize::from(length);
    let available = data.len() - value_start;
    if declared > available {
        return Err(DecodeError::Truncated {
            declared,
            available,
        });
    }
    Ok(&data[value_start..value_start + declared])
}

/// Bytes needed to cover the first envelope up to and including its
/// terminator, once the length byte is known.
pub fn envelope_end(data: &[u8]) -> Option<usize> {
    let start = data.iter().position(|&b| b == TLV_NDEF_MESSAGE)?;
    let length = *data.get(start + 1)?;
    Some(start + 2 + usize::from(length) + 1)
}

/// Decodes the bytes read from page 4 on back into a payment record.
///
/// Records are walked in message order and the first well-known URI record
/// wins, so tags carrying e.g. a Text record in front still decode.
pub fn decode(data: &[u8]) -> Result<PaymentRecord, DecodeError> {
    let message = find_envelope(data)?;
    let mut input = (message, 0);
    let record = loop {
        let (rest, record) = Record::from_bytes(input).map_err(|e| {
            DecodeError::UnrecognizedPayload(format!("malformed NDEF record: {e}"))
        })?;
        if record.is_uri() {
            break record;
        }
        tracing::trace!(
            "Skipping {:?} record of type {:02X?}",
            record.type_name_format(),
            record.record_type()
        );
        if record.message_end || rest.0.is_empty() {
            return Err(DecodeError::UnrecognizedPayload(format!(
                "no well-known URI record in message, last was {:?} type {:02X?}",
                record.type_name_format(),
                record.record_type()
            )));
        }
        input = rest;
    };
    let url = record.uri_payload()?;
    tracing::trace!("Decoded tag URL {}", url);
    PaymentRecord::from_url(&url)
        .map_err(|e| DecodeError::UnrecognizedPayload(format!("'{url}' is not a URL: {e}")))
}

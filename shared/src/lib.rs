pub mod ndef;
pub mod nfc;
pub mod ntag_sim;
pub mod payment;
pub mod settings;

pub use ndef::{DecodeError, EncodeError, PageStream};
pub use nfc::{
    DeviceError, ReadFailure, SessionError, SessionState, TagDevice, TagSession, TagUid,
    WriteReport,
};
pub use ntag_sim::SimulatedTag;
pub use payment::{BANK_OPTIONS, PaymentRecord, bank_code};
pub use settings::{EraseMode, SessionConfig};

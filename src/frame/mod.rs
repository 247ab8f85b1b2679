//! # HTTP/2 フレーム処理 (RFC 7540 Section 4-6)

pub mod decoder;
pub mod encoder;
pub mod types;

pub use decoder::{Decoded, ExtensionDecoder, FrameDecoder};
pub use encoder::{ExtensionEncoder, FrameEncoder};
pub use types::{Frame, FrameFlags, FrameHeader, FrameType, HeaderEntry, HeaderList, PrioritySpec};

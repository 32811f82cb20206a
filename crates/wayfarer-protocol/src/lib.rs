//! # wayfarer-protocol
//!
//! Wire protocol definitions for the Wayfarer hub client.
//!
//! Frames are single text messages with comma-delimited headers followed by
//! a JSON payload:
//!
//! ```text
//! ack,{"mediatorId":"m9","roomId":"r2","roomName":"Lobby"}
//! room,r2,{"username":"alice","userId":"u1","content":"hello"}
//! sos,r2,{}
//! ```
//!
//! ## Example
//!
//! ```rust
//! use wayfarer_protocol::{codec, Frame};
//!
//! let frame = Frame::room("r1", serde_json::json!({"content": "hi"}));
//! let text = codec::encode(&frame).unwrap();
//! assert_eq!(text, r#"room,r1,{"content":"hi"}"#);
//!
//! let decoded = codec::decode(&text);
//! assert!(!decoded.is_recovered());
//! assert_eq!(decoded.into_frame(), frame);
//! ```

pub mod codec;
pub mod frames;

pub use codec::{decode, encode, Decoded, MalformedPayload, ProtocolError};
pub use frames::{Frame, FrameKind};

//! wsgate-core: Shared protocol library for the wsgate WebSocket gateway.
//!
//! Provides RFC 6455 text framing, the HTTP upgrade handshake, the
//! line-oriented control protocol, and the gateway process record.

pub mod codec;
pub mod control;
pub mod error;
pub mod handshake;
pub mod record;

// Re-export commonly used items at crate root.
pub use codec::{decode, encode, encode_masked, is_close_frame};
pub use control::{send_command, ControlMessage};
pub use error::{GatewayError, GatewayResult};
pub use handshake::{accept_key, negotiate};
pub use record::ProcessRecord;

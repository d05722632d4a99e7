//! claude-hud-source-fifo: hook event stream over a named pipe.
//! The hook side writes one JSON record per line into a FIFO; this crate
//! keeps a reader attached across writer restarts and frames the byte
//! stream back into [`HudEvent`](claude_hud_core::types::HudEvent)s.

pub mod decode;
pub mod transport;

pub use decode::{DecodeError, LineDecoder};
pub use transport::{StreamTransport, TransportError, TransportMessage, TransportOptions};

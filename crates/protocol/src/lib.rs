//! Wire types for the debugger-transport multiplexer.
//!
//! These are the JSON shapes exchanged with the automation client over its
//! single bidirectional channel:
//!
//! - [`Command`]: client → bridge, always carries an `id`
//! - [`Response`]: bridge → client, `result` or `error` tagged with the command's `id`
//! - [`Event`]: bridge → client, unsolicited, never carries an `id`
//!
//! Types in this crate are pure data. Correlation and lifecycle live in
//! `dbgmux-runtime`.

pub mod message;

pub use message::*;

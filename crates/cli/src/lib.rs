//! Command-line front end for the debugger-transport multiplexer.

pub mod cli;
pub mod logging;
pub mod probe;
pub mod relay;

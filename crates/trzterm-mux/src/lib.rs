//! Terminal channel multiplexing.
//!
//! [`frame`] is the wire grammar shared by client and server;
//! [`multiplexer`] is the client-side actor that shows terminal output and
//! hands the channel to a transfer session whenever one is announced.

pub mod frame;
pub mod multiplexer;

pub use frame::{Frame, InputEvent};
pub use multiplexer::{
    ChannelSink, Multiplexer, MuxHandle, MuxOptions, TerminalDisplay, UploadResult,
};

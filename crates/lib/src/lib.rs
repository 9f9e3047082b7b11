//! LINE echo responder core: webhook authentication, event decoding and dispatch, config,
//! and the HTTP gateway used by the CLI.

pub mod channels;
pub mod config;
pub mod gateway;
pub mod init;

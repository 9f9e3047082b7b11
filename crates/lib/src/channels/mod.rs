//! Communication channels (e.g. LINE).
//!
//! A channel turns platform webhook deliveries into replies sent back through the platform's API.

pub mod line;

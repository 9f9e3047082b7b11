//! Gateway: HTTP server hosting channel webhooks.
//!
//! Single port. Each webhook request is authenticated and answered inline; the HTTP status
//! reflects the dispatch outcome.

mod server;

pub use server::{router, run_gateway, GatewayState, LINE_WEBHOOK_PATH};

//! Module Exports
//!
//! - `dispatch`: maps a route and request body onto motor driver calls.
//! - `server`: picoserve router and the tokio accept loop.

pub mod dispatch;
pub mod server;

//! Debugger-facing side of the rdbg trace inspector.
//!
//! [`client::DapClient`] speaks DAP to the rdbg adapter,
//! [`inspector::DapTraceBackend`] maps the engine's backend requests onto the
//! `rdbgTraceInspector` custom request and [`session::InspectorSession`]
//! drives a [`rdbg_trace::TraceRouter`] from adapter events.

pub mod client;
pub mod dap;
pub mod inspector;
pub mod protocol;
pub mod render;
pub mod session;

pub use client::{ClientError, DapClient, DapClientConfig};
pub use inspector::DapTraceBackend;
pub use session::{InspectorSession, SessionError, SessionUpdate};

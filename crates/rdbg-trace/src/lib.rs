//! Log-to-tree engine of the rdbg trace inspector.
//!
//! The debugger hands out flat, depth-tagged execution records (line, call,
//! exception, full trace and record/replay histories). This crate turns them
//! into navigable forests:
//!
//! - [`materialize`] builds a forest from one slice of records, inserting
//!   omitted-range placeholders where a window cut off enclosing calls;
//! - [`window`] and [`paging`] are the two pagination strategies (a local
//!   sliding window over a fully fetched log, or pages fetched on demand);
//! - [`cursor`] steps through a partition in flat history order;
//! - [`router`] owns every partition of one debug session and rebuilds them
//!   when the debugger reports new logs.
//!
//! All debugger I/O goes through [`backend::TraceBackend`].

pub mod annotations;
pub mod backend;
pub mod cursor;
pub mod error;
pub mod materialize;
pub mod paging;
pub mod partition;
pub mod profile;
pub mod record;
pub mod router;
pub mod tree;
pub mod window;

#[cfg(any(test, feature = "test-support"))]
pub mod mock;

pub use backend::{BackendError, PlaybackDirection, TraceBackend, TraceEvent, TraceOptions};
pub use cursor::{Cursor, Reveal};
pub use error::{TraceError, TraceResult};
pub use partition::{PartitionKey, TracePartition};
pub use profile::{PageSizes, TraceProfile, TreeItem, WindowConfig};
pub use record::{LogRecord, RecordIndex, RecordSnapshot, ThreadId, TraceKind};
pub use router::{KindUpdate, LogsUpdated, RefreshEvent, RouterConfig, TraceRouter};
pub use tree::{NodeId, NodeKind, TraceTree};

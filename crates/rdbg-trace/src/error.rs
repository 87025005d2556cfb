use thiserror::Error;

use crate::backend::BackendError;
use crate::record::RecordIndex;
use crate::tree::NodeId;

pub type TraceResult<T> = Result<T, TraceError>;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    /// The debugger sent a record without a field its kind requires.
    #[error("record {index} is missing required field `{field}`")]
    MalformedRecord {
        index: RecordIndex,
        field: &'static str,
    },
    #[error("node {0} does not belong to the current tree")]
    StaleNode(NodeId),
}

use std::io;
use thiserror::Error;

/// The failure vocabulary of the render farm. Coordinator-side validation
/// failures map onto RPC status codes at the transport boundary; `Fatal`
/// covers invariant violations (a worker that cannot reconstruct the scene
/// exits, the coordinator keeps serving).
#[derive(Debug, Error)]
pub enum Error {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unknown worker")]
    Unauthenticated,

    #[error("no such task")]
    NotFound,

    #[error("lease held by another worker")]
    PermissionDenied,

    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),

    #[error("{0}")]
    Fatal(String),
}

use helm_pty::LaunchFailure;

/// Errors surfaced by the [`Multiplexer`](crate::Multiplexer) facade.
///
/// Only session creation can fail in a way the caller can act on. Every other
/// operation reports an unknown or dead session as a `false`/`None` result.
#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error(transparent)]
    Launch(#[from] LaunchFailure),

    #[error("multiplexer has shut down")]
    Closed,
}

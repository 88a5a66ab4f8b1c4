use thiserror::Error;

/// Errors produced by the core transport and userauth state machine.
///
/// [`Error::NeedMore`] is a control signal rather than a failure: [`crate::Session::poll`]
/// turns it into `Ok(None)` and it should never reach a caller directly.
#[derive(Debug, Error)]
pub enum Error {
    /// The inbound buffer does not yet hold a complete record.
    #[error("not enough bytes buffered yet")]
    NeedMore,

    /// Wire decoding failed.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// A well-formed message arrived but violates the currently expected message.
    #[error("unexpected message in the current state")]
    Unexpected,

    /// Integrity check failed while parsing an inbound packet.
    #[error("MAC verification failed")]
    MacFailure,

    /// No algorithm common to both peers could be found for some category.
    #[error("no common algorithm could be negociated")]
    NegotiationFailure,

    /// More than 10 userauth attempts failed for the current session.
    #[error("authentication attempts exhausted")]
    AuthExhausted,

    /// A message outside of this core's scope was received (e.g. past authentication).
    #[error("message not handled by the transport/userauth core")]
    Unhandled,

    /// A host-key operation failed.
    #[error(transparent)]
    Key(#[from] ssh_key::Error),

    /// A signature operation failed.
    #[error(transparent)]
    Signature(#[from] signature::Error),
}

/// Convenience alias for this crate's [`Result`](std::result::Result).
pub type Result<T, E = Error> = std::result::Result<T, E>;

use crate::LoaderError;

/// The capability `BatchBuilder` needs from a connection to the graph
/// server: send a named command with raw-byte arguments, block until the
/// server acknowledges it, and return its reply.
///
/// Implementations must be synchronous — the loader issues one command at
/// a time and never starts a new batch before the previous one is
/// acknowledged, since the server's cumulative tallies must stay
/// monotone (see the crate-level concurrency notes).
pub trait ServerLink {
    /// Opaque reply type; the loader only needs to know whether the send
    /// succeeded, so implementations are free to discard most of it.
    type Reply;

    fn send(&mut self, command: &str, args: &[Vec<u8>]) -> Result<Self::Reply, LoaderError>;
}

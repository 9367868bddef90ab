//! Outbound forwarding loop
//!
//! Each session runs one forwarding loop that waits on exactly two things:
//! its own outbound queue and its cancellation signal. It never waits on
//! another session's state.

use std::future::Future;

use crate::registry::OutboundQueue;

/// Why a forwarding loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardEnd {
    /// The cancellation signal fired
    Shutdown,
    /// The session was deactivated and its queue closed
    Closed,
}

/// Forward frames from `queue` to `send` until `shutdown` resolves or the
/// queue closes
///
/// A send error stops the loop and is returned to the caller.
pub async fn forward<T, F, S, Fut, E>(
    queue: &mut OutboundQueue<T>,
    shutdown: F,
    mut send: S,
) -> Result<ForwardEnd, E>
where
    F: Future<Output = ()>,
    S: FnMut(T) -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    tokio::pin!(shutdown);

    loop {
        let frame = tokio::select! {
            _ = &mut shutdown => return Ok(ForwardEnd::Shutdown),
            frame = queue.recv() => frame,
        };

        let Some(frame) = frame else {
            return Ok(ForwardEnd::Closed);
        };

        tokio::select! {
            _ = &mut shutdown => return Ok(ForwardEnd::Shutdown),
            sent = send(frame) => sent?,
        }
    }
}

use std::future::Future;

use crate::error::DrainResult;

/// A background worker that can be started once.
///
/// The generic parameter `H` is the handle returned on start and `S` the state type readable
/// through it.
pub trait Worker<H, S>
where
    H: WorkerHandle<S>,
{
    /// Error type returned when the worker cannot be started.
    type Error;

    /// Starts the worker in the background and returns immediately with its handle.
    fn start(self) -> Result<H, Self::Error>;
}

/// Handle for monitoring a running worker and waiting for it to exit.
pub trait WorkerHandle<S> {
    /// Returns the current state of the worker.
    ///
    /// The value is a snapshot and may be stale as soon as it is returned.
    fn state(&self) -> S;

    /// Waits for the worker to exit. The handle is consumed.
    fn wait(self) -> impl Future<Output = DrainResult<()>> + Send;
}

//! Concurrency primitives coordinating producers, workers and the executor lifecycle.
//!
//! # Cancellation
//!
//! [`cancellation`] provides a broadcast, one-way [`cancellation::CancellationToken`]. The
//! executor owns two of them: one stops admission and marks the start of shutdown, the other is
//! handed to tasks and is only fired by a hard cancel. Tokens never transition back.
//!
//! # Queueing
//!
//! [`queue`] provides the fixed-capacity FIFO sitting between admission and the workers.
//! Closing it stops producers immediately while consumers keep receiving what was already
//! queued, which is what makes a graceful drain possible.

pub mod cancellation;
pub mod queue;

//! Cancellation signal threaded through a chain run
//!
//! Cancellation is cooperative: strategies check the token before starting a
//! step or a group and stop issuing new work once it is set. Work already in
//! flight is never interrupted. Child tokens observe their parent's
//! cancellation; cancelling a child leaves the parent alone.

pub use tokio_util::sync::CancellationToken;

//! Cooperative cancellation.
//!
//! The executor checks the token before each stage. A stage call already in
//! flight is not interrupted. [`crate::invoke::Invoker::invoke`] does not
//! receive the run's token; an invoker that wants to stop early must hold a
//! clone of the token, captured when it was built, and await
//! [`CancellationToken::cancelled`].

mod token;

pub use token::{CancelCallback, CancellationToken};

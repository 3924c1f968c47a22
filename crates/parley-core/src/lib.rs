//! Core types and error definitions for Parley.
//!
//! This crate holds the pieces every other Parley crate shares: the error
//! taxonomy and the conversation turn representation.
//!
//! # Main types
//!
//! - [`ParleyError`]: Unified error enum for all Parley subsystems.
//! - [`ParleyResult`]: Convenience alias for `Result<T, ParleyError>`.
//! - [`Role`]: Author of a turn (user, assistant, system).
//! - [`Turn`]: One immutable message within a conversation thread.

mod error;
mod turn;

pub use error::{ParleyError, ParleyResult};
pub use turn::{Role, Turn};

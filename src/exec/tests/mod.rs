//! Unit tests for the exec module.
//!
//! Split by concern: command rendering, ssh argument construction, capture
//! mode outcomes and the streaming handle lifecycle.

mod fixtures;
mod ssh;

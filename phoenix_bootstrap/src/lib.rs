//! Process entry point for Phoenix.
//!
//! Sits outside the domain/infrastructure/application layers defined in
//! `phoenix_domain` and `phoenix`: this crate owns CLI parsing, signal
//! handling, and the composition root that wires a loaded policy into a
//! running `PhoenixRuntime`. Nothing in `phoenix` or `phoenix_domain`
//! depends back on this crate.

pub mod cli;
pub mod exit_code;
pub mod shutdown;
pub mod signals;

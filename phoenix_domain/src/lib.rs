//! # Phoenix Domain
//!
//! Pure business logic for Phoenix's closed-loop adaptive control core: the
//! metric data model, the `AdaptiveProcessor` contract, the sketch and
//! sampling algorithms the reference processors are built on, and the
//! `PidController`. Nothing here touches an async runtime, does I/O, or
//! depends on a logging framework — infrastructure concerns live in the
//! `phoenix` crate, which implements these traits.
//!
//! ## Layout
//!
//! - [`value_objects`] — `MetricBatch` and friends, `ConfigPatch`,
//!   `ConfigStatus`, `BoundedParam`, `Policy`.
//! - [`entities`] — `SelfTelemetrySample`.
//! - [`events`] — `GovernorEvent`.
//! - [`services`] — the `AdaptiveProcessor` trait, `PidController`, and the
//!   sketch/sampling leaves (`sketches::SpaceSaving`,
//!   `sketches::HyperLogLog`, `sketches::Reservoir`).
//! - [`repositories`] — `ProcessorRegistry` and `PolicyRepository`, the
//!   narrow abstractions the governor depends on.
//! - [`aggregates`] — `DecisionTrace`.

pub mod aggregates;
pub mod entities;
pub mod error;
pub mod events;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use error::PhoenixError;

//! `PolicyRepository`: the narrow abstraction the governor and CLI use to
//! read the current policy and trigger a reload, leaving the actual file
//! format and hot-reload mechanism to infrastructure.

use crate::error::PhoenixError;
use crate::value_objects::Policy;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait PolicyRepository: Send + Sync {
    /// Current, fully validated policy. Always returns the last-known-good
    /// document, even if the most recent reload attempt failed.
    fn current(&self) -> Arc<Policy>;

    /// Forces a reload from the backing source. On failure the previous
    /// policy remains in effect and is returned unchanged as `current()`.
    async fn reload(&self) -> Result<Arc<Policy>, PhoenixError>;
}

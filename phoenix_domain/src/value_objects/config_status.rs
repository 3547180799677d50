//! Snapshot of a processor's fully-resolved tunable state, returned by
//! `AdaptiveProcessor::get_config_status`.

use crate::value_objects::config_patch::PatchValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A point-in-time view of every tunable parameter on one processor, plus
/// its `enabled` flag. `BTreeMap` keeps `dump-status` output deterministically
/// ordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigStatus {
    pub processor_id: String,
    pub enabled: bool,
    pub parameters: BTreeMap<String, PatchValue>,
}

impl ConfigStatus {
    pub fn new(processor_id: impl Into<String>, enabled: bool) -> Self {
        Self {
            processor_id: processor_id.into(),
            enabled,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, path: impl Into<String>, value: PatchValue) -> Self {
        self.parameters.insert(path.into(), value);
        self
    }
}

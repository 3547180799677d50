//! `PriorityTagger`: assigns `phoenix.priority` by matching
//! `process.name` (or a configured attribute) against an ordered list of
//! `{regex, priority}` rules. First match wins; the rule list is replaced
//! atomically and only after every pattern in the replacement compiles.

use crate::infrastructure::metrics::MetricsService;
use async_trait::async_trait;
use parking_lot::RwLock;
use phoenix_domain::services::{AdaptiveProcessor, Capabilities};
use phoenix_domain::value_objects::{ConfigPatch, ConfigStatus, MetricBatch, PatchValue, PriorityRule};
use phoenix_domain::PhoenixError;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct CompiledRule {
    regex: Regex,
    priority: phoenix_domain::value_objects::PriorityLevel,
}

struct State {
    rules: Vec<CompiledRule>,
    raw_rules: Vec<PriorityRule>,
    attribute_key: String,
}

pub struct PriorityTagger {
    state: RwLock<State>,
    enabled: AtomicBool,
    metrics: Arc<MetricsService>,
}

impl PriorityTagger {
    pub fn new(rules: Vec<PriorityRule>, attribute_key: impl Into<String>, metrics: Arc<MetricsService>) -> Result<Self, PhoenixError> {
        let compiled = compile_rules(&rules)?;
        Ok(Self {
            state: RwLock::new(State {
                rules: compiled,
                raw_rules: rules,
                attribute_key: attribute_key.into(),
            }),
            enabled: AtomicBool::new(true),
            metrics,
        })
    }
}

fn compile_rules(rules: &[PriorityRule]) -> Result<Vec<CompiledRule>, PhoenixError> {
    rules
        .iter()
        .map(|rule| {
            Regex::new(&rule.pattern)
                .map(|regex| CompiledRule {
                    regex,
                    priority: rule.priority,
                })
                .map_err(|e| PhoenixError::InvalidRegex(format!("{}: {e}", rule.pattern)))
        })
        .collect()
}

#[async_trait]
impl AdaptiveProcessor for PriorityTagger {
    fn processor_id(&self) -> &str {
        "priority_tagger"
    }

    async fn consume(&self, mut batch: MetricBatch) -> Result<MetricBatch, PhoenixError> {
        self.metrics.inc_processor_throughput(self.processor_id());
        if !self.enabled.load(Ordering::Acquire) {
            return Ok(batch);
        }

        let state = self.state.read();
        for resource in batch.resources.iter_mut() {
            let Some(value) = resource.attributes.get(&state.attribute_key) else {
                continue;
            };
            for rule in &state.rules {
                if rule.regex.is_match(value) {
                    resource.set_priority(rule.priority);
                    break;
                }
            }
        }
        Ok(batch)
    }

    async fn on_config_patch(&self, patch: &ConfigPatch) -> Result<(), PhoenixError> {
        match patch.parameter_path.as_str() {
            "enabled" => {
                let value = patch
                    .new_value
                    .as_bool()
                    .ok_or_else(|| PhoenixError::OutOfBounds {
                        parameter: patch.parameter_path.clone(),
                        value: 0.0,
                        min: 0.0,
                        max: 1.0,
                    })?;
                self.enabled.store(value, Ordering::Release);
                Ok(())
            }
            "rules" => {
                let rules = patch
                    .new_value
                    .as_rules()
                    .ok_or_else(|| PhoenixError::InvalidRegex("patch did not carry a rule array".into()))?;
                // Validate every pattern compiles before committing, so a
                // single bad regex leaves the active rule set unchanged.
                let compiled = compile_rules(rules)?;
                let mut state = self.state.write();
                state.rules = compiled;
                state.raw_rules = rules.to_vec();
                Ok(())
            }
            "attribute_key" => {
                let value = patch
                    .new_value
                    .as_str()
                    .ok_or_else(|| PhoenixError::UnknownParameter(patch.parameter_path.clone(), self.processor_id().into()))?;
                self.state.write().attribute_key = value.to_string();
                Ok(())
            }
            other => Err(PhoenixError::UnknownParameter(other.to_string(), self.processor_id().into())),
        }
    }

    fn get_config_status(&self) -> ConfigStatus {
        let state = self.state.read();
        let enabled = self.enabled.load(Ordering::Acquire);
        self.metrics.set_processor_enabled(self.processor_id(), enabled);
        ConfigStatus::new(self.processor_id(), enabled)
            .with_param("rules", PatchValue::RuleArray(state.raw_rules.clone()))
            .with_param("attribute_key", PatchValue::String(state.attribute_key.clone()))
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            mutates_in_place: true,
            can_reject_semantic_patches: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_domain::value_objects::{PatchSeverity, PatchSource, PriorityLevel, ResourceMetrics};
    use std::collections::HashMap;

    fn metrics() -> Arc<MetricsService> {
        Arc::new(MetricsService::new().unwrap())
    }

    fn resource(name: &str) -> ResourceMetrics {
        let mut attributes = HashMap::new();
        attributes.insert("process.name".to_string(), name.to_string());
        ResourceMetrics {
            attributes,
            metrics: Vec::new(),
        }
    }

    #[tokio::test]
    async fn first_matching_rule_wins() {
        let rules = vec![
            PriorityRule { pattern: "^db-.*".into(), priority: PriorityLevel::Critical },
            PriorityRule { pattern: ".*".into(), priority: PriorityLevel::Low },
        ];
        let tagger = PriorityTagger::new(rules, "process.name", metrics()).unwrap();
        let batch = MetricBatch::new(vec![resource("db-primary")]);
        let out = tagger.consume(batch).await.unwrap();
        assert_eq!(out.resources[0].priority(), Some(PriorityLevel::Critical));
    }

    #[tokio::test]
    async fn invalid_regex_patch_leaves_rule_set_unchanged() {
        let rules = vec![PriorityRule { pattern: "^db-.*".into(), priority: PriorityLevel::Critical }];
        let tagger = PriorityTagger::new(rules.clone(), "process.name", metrics()).unwrap();

        let bad_patch = ConfigPatch::new(
            "priority_tagger",
            "rules",
            PatchValue::RuleArray(vec![PriorityRule { pattern: "(".into(), priority: PriorityLevel::High }]),
            "operator edit",
            PatchSeverity::Normal,
            PatchSource::Operator,
            0,
        );
        let err = tagger.on_config_patch(&bad_patch).await.unwrap_err();
        assert!(matches!(err, PhoenixError::InvalidRegex(_)));

        let status = tagger.get_config_status();
        assert_eq!(status.parameters.get("rules"), Some(&PatchValue::RuleArray(rules)));
    }

    #[tokio::test]
    async fn disabled_tagger_leaves_priority_unset() {
        let rules = vec![PriorityRule { pattern: ".*".into(), priority: PriorityLevel::High }];
        let tagger = PriorityTagger::new(rules, "process.name", metrics()).unwrap();
        tagger
            .on_config_patch(&ConfigPatch::new(
                "priority_tagger",
                "enabled",
                PatchValue::Bool(false),
                "disable",
                PatchSeverity::Normal,
                PatchSource::Operator,
                0,
            ))
            .await
            .unwrap();
        let out = tagger.consume(MetricBatch::new(vec![resource("anything")])).await.unwrap();
        assert_eq!(out.resources[0].priority(), None);
    }
}

//! Structured-text rendering for the `dump-status` CLI command. Kept
//! separate from the domain's [`ConfigStatus`] so output formatting can
//! change without touching the value object it renders.

use phoenix_domain::value_objects::{ConfigStatus, PatchValue};
use std::fmt::Write as _;

fn render_value(value: &PatchValue) -> String {
    match value {
        PatchValue::Int(v) => v.to_string(),
        PatchValue::Double(v) => format!("{v}"),
        PatchValue::Bool(v) => v.to_string(),
        PatchValue::String(v) => v.clone(),
        PatchValue::RuleArray(rules) => {
            let rendered: Vec<String> = rules
                .iter()
                .map(|r| format!("{{pattern={:?}, priority={}}}", r.pattern, r.priority))
                .collect();
            format!("[{}]", rendered.join(", "))
        }
    }
}

/// Renders every processor's config status as one line per parameter,
/// grouped under a `processor_id [enabled=...]` header, in the order given
/// (pipeline order, per [`ProcessorRegistry::snapshot_all`]).
pub fn render_status(statuses: &[ConfigStatus]) -> String {
    let mut out = String::new();
    for status in statuses {
        let _ = writeln!(out, "{} [enabled={}]", status.processor_id, status.enabled);
        for (parameter, value) in &status.parameters {
            let _ = writeln!(out, "  {parameter} = {}", render_value(value));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn renders_parameters_under_processor_header() {
        let mut parameters = BTreeMap::new();
        parameters.insert("k_value".to_string(), PatchValue::Int(40));
        let status = ConfigStatus { processor_id: "topk".to_string(), enabled: true, parameters };

        let rendered = render_status(&[status]);
        assert!(rendered.contains("topk [enabled=true]"));
        assert!(rendered.contains("k_value = 40"));
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// Totally ordered priority assigned to a `ResourceMetrics` as the
/// `phoenix.priority` attribute. Once set on a resource it is never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for PriorityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PriorityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown priority level '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_total() {
        assert!(PriorityLevel::Low < PriorityLevel::Medium);
        assert!(PriorityLevel::Medium < PriorityLevel::High);
        assert!(PriorityLevel::High < PriorityLevel::Critical);
    }

    #[test]
    fn round_trips_through_display_and_from_str() {
        for level in [
            PriorityLevel::Low,
            PriorityLevel::Medium,
            PriorityLevel::High,
            PriorityLevel::Critical,
        ] {
            let parsed: PriorityLevel = level.to_string().parse().unwrap();
            assert_eq!(level, parsed);
        }
    }
}

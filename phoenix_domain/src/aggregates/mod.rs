pub mod decision_trace;

pub use decision_trace::{Decision, DecisionResult, DecisionTrace};

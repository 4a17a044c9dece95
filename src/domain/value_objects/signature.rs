use super::ItemInstanceId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-address of a job's inputs, used to dedup equivalent job instances.
///
/// Computed as the sorted, `,`-joined concatenation of every input instance
/// id the job would consume (grouped inputs contribute their whole sorted
/// set). Two jobs of the same module with the same signature are the same
/// job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobSignature(pub String);

impl JobSignature {
    pub fn compute(module: &str, input_ids: impl IntoIterator<Item = ItemInstanceId>) -> Self {
        let mut ids: Vec<String> = input_ids.into_iter().map(|id| id.0).collect();
        ids.sort();
        Self(format!("{module}:{}", ids.join(",")))
    }
}

impl fmt::Display for JobSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ItemInstanceId {
        ItemInstanceId(s.to_string())
    }

    #[test]
    fn signature_is_order_independent() {
        let a = JobSignature::compute("m", vec![id("b"), id("a")]);
        let b = JobSignature::compute("m", vec![id("a"), id("b")]);
        assert_eq!(a, b);
    }

    #[test]
    fn signature_differs_by_module() {
        let a = JobSignature::compute("m1", vec![id("a")]);
        let b = JobSignature::compute("m2", vec![id("a")]);
        assert_ne!(a, b);
    }
}

use thiserror::Error;

/// Errors raised by the IPPO core.
///
/// All variants are fatal: every operation is a pure function of its inputs
/// and keys, so a failure reproduces until the configuration or the
/// collaborator is fixed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IppoError {
    #[error("Shape mismatch in {context}: expected {expected}, got {got}")]
    ShapeMismatch {
        context: &'static str,
        expected: String,
        got: String,
    },

    #[error("Agent '{0}' is missing from the agent dictionary")]
    MissingAgent(String),

    #[error("Agent '{0}' is not part of the declared agent list")]
    UnexpectedAgent(String),

    #[error(
        "Batch of {batch_size} cannot be split into {num_minibatches} minibatches of {minibatch_size}"
    )]
    BatchSizeMismatch {
        batch_size: usize,
        minibatch_size: usize,
        num_minibatches: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Network backend error: {0}")]
    Backend(String),
}

impl IppoError {
    pub(crate) fn shape(
        context: &'static str,
        expected: impl ToString,
        got: impl ToString,
    ) -> Self {
        IppoError::ShapeMismatch {
            context,
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

#[cfg(feature = "rl-nn")]
impl From<tch::TchError> for IppoError {
    fn from(e: tch::TchError) -> Self {
        IppoError::Backend(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IppoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_mismatch_display() {
        let e = IppoError::BatchSizeMismatch {
            batch_size: 30,
            minibatch_size: 7,
            num_minibatches: 4,
        };
        assert_eq!(
            e.to_string(),
            "Batch of 30 cannot be split into 4 minibatches of 7"
        );
    }

    #[test]
    fn shape_helper_formats_fields() {
        let e = IppoError::shape("batchify", "(4, 3)", "(4, 2)");
        assert_eq!(
            e.to_string(),
            "Shape mismatch in batchify: expected (4, 3), got (4, 2)"
        );
    }

    #[test]
    fn missing_agent_display() {
        let e = IppoError::MissingAgent("agent_1".to_string());
        assert_eq!(
            e.to_string(),
            "Agent 'agent_1' is missing from the agent dictionary"
        );
    }
}

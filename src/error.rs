use thiserror::Error;

use crate::params::ParameterName;
use crate::scene::NodeId;

/// Failures raised by the hologram effect core.
///
/// Parameter errors are raised before anything is written, so parameters,
/// instances and materials are unchanged. `enable` tears down an existing
/// binding before applying the new one; if applying fails, the effect is left
/// disabled with original materials restored and no partial binding kept.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HologramError {
    #[error("no renderable object is bound to the hologram effect")]
    NoTarget,
    #[error("unknown hologram parameter `{0}`")]
    UnknownParameter(String),
    #[error("invalid value for `{name}`: {reason}")]
    InvalidValue {
        name: ParameterName,
        reason: String,
    },
    #[error("node {0} already carries a hologram material")]
    AlreadyApplied(NodeId),
    #[error("the hologram effect must be disabled before binding a new target")]
    RetargetWhileEnabled,
    #[error("node {0} is not part of the scene")]
    MissingNode(NodeId),
}

impl HologramError {
    pub(crate) fn invalid(name: ParameterName, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = HologramError> = std::result::Result<T, E>;

use thiserror::Error;

/// Failures that abort session provisioning.
///
/// Everything here means "no usable session was produced"; the registry is
/// left without any half-provisioned entry for the user in question.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The username does not map to a system account. Nothing was allocated.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("failed to create wayland socket: {0:#}")]
    Socket(anyhow::Error),

    #[error("failed to create xwayland instance: {0:#}")]
    Xwayland(anyhow::Error),
}

//! Typed provisioning error enum.
//!
//! Every step of the provisioning sequence fails into exactly one of these
//! variants, so a caller can tell which step aborted the run. All variants
//! convert to `anyhow::Error` via the `?` operator.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of the provisioning sequence, one category per step.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The HTTP port never answered within the readiness deadline.
    #[error("Gerrit did not answer at {url} within {waited_secs}s.")]
    NotReady { url: String, waited_secs: u64 },

    /// Bootstrap or login verification got a non-success HTTP status.
    #[error("admin bootstrap failed: HTTP {status} for {url}")]
    Bootstrap { url: String, status: u16 },

    /// `ssh-keygen` exited non-zero or did not produce the expected files.
    #[error("ssh-keygen failed: {detail}")]
    KeyGeneration { detail: String },

    /// A private key was supplied but the key files are not on disk.
    #[error("key file not found: {path}")]
    KeyMissing { path: PathBuf },

    /// The public key upload got a non-success HTTP status.
    #[error("ssh key upload failed: HTTP {status} for {url}")]
    KeyRegistration { url: String, status: u16 },

    /// The ssh smoke test exited non-zero or could not be launched.
    #[error(
        "ssh smoke test failed ({command}): {status}\nstdout: {stdout}\nstderr: {stderr}"
    )]
    KeyVerification {
        command: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

impl ProvisionError {
    /// True when the failure is the server rejecting our credentials,
    /// as opposed to a transport problem or an unexpected status.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Bootstrap { status: 401, .. } | Self::KeyRegistration { status: 401, .. }
        )
    }
}

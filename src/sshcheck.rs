//! SSH smoke test — proves the registered key opens a real session.

use anyhow::Result;

use crate::command_runner::{CommandRunner, TokioCommandRunner};
use crate::error::ProvisionError;
use crate::keygen::KeyPair;
use crate::provision::GerritSite;

/// Remote command whose zero exit proves the key is accepted. Output is
/// not parsed.
pub const SMOKE_TEST_COMMAND: &[&str] = &["gerrit", "version"];

/// SSH probe against a provisioned instance, enabling test doubles.
#[allow(async_fn_in_trait)]
pub trait SshProbe {
    /// Open an SSH session with the private key and run `gerrit version`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::KeyVerification`] on a non-zero exit or
    /// when the client cannot be launched.
    async fn gerrit_version(&self, site: &GerritSite, keys: &KeyPair) -> Result<()>;
}

/// Production probe — shells out to the system `ssh` client.
pub struct SshCli<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> SshCli<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl SshCli<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(TokioCommandRunner::default())
    }
}

/// Argument list for the probe. The target is a throwaway instance with no
/// stable host identity, so host keys are neither checked nor stored, and
/// `BatchMode` forbids every interactive fallback.
fn ssh_args(site: &GerritSite, keys: &KeyPair) -> Vec<String> {
    let mut args = vec![
        "-o".into(),
        "LogLevel=ERROR".into(),
        "-o".into(),
        "UserKnownHostsFile=/dev/null".into(),
        "-o".into(),
        "StrictHostKeyChecking=no".into(),
        "-o".into(),
        "BatchMode=yes".into(),
        "-i".into(),
        keys.private_key.display().to_string(),
        "-p".into(),
        site.ssh_port.to_string(),
        site.ssh_destination(),
    ];
    args.extend(SMOKE_TEST_COMMAND.iter().map(ToString::to_string));
    args
}

impl<R: CommandRunner> SshProbe for SshCli<R> {
    async fn gerrit_version(&self, site: &GerritSite, keys: &KeyPair) -> Result<()> {
        let args = ssh_args(site, keys);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = format!("ssh {}", args.join(" "));

        let output = match self.runner.run("ssh", &arg_refs).await {
            Ok(output) => output,
            Err(e) => {
                return Err(ProvisionError::KeyVerification {
                    command,
                    status: format!("did not launch: {e:#}"),
                    stdout: String::new(),
                    stderr: String::new(),
                }
                .into());
            }
        };

        if !output.status.success() {
            return Err(ProvisionError::KeyVerification {
                command,
                status: output.status.to_string(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            }
            .into());
        }
        Ok(())
    }
}

//! SSH keypair generation via the `ssh-keygen` binary.
//!
//! Keys land in a fresh uniquely-named temp directory that is deliberately
//! NOT removed: the surrounding test harness keeps using the private key
//! after this process exits, and provisioned instances are short-lived.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::command_runner::{CommandRunner, TokioCommandRunner};
use crate::error::ProvisionError;

/// Fixed private key filename inside the generated directory.
pub const KEY_FILENAME: &str = "id_rsa";

/// Prefix for the generated key directory.
const KEY_DIR_PREFIX: &str = "gerritup-keys-";

/// A private key and its sibling `.pub` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

impl KeyPair {
    /// Build a pair from the private key path; the public key is always
    /// the sibling file with `.pub` appended.
    #[must_use]
    pub fn from_private(private_key: PathBuf) -> Self {
        let mut public = private_key.clone().into_os_string();
        public.push(".pub");
        Self {
            private_key,
            public_key: PathBuf::from(public),
        }
    }

    /// Verify both files exist on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::KeyMissing`] naming the absent file.
    pub fn ensure_on_disk(&self) -> Result<(), ProvisionError> {
        for path in [&self.private_key, &self.public_key] {
            if !path.is_file() {
                return Err(ProvisionError::KeyMissing { path: path.clone() });
            }
        }
        Ok(())
    }

    /// Read the raw public key bytes for upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the public key file cannot be read.
    pub fn read_public(&self) -> Result<Vec<u8>> {
        std::fs::read(&self.public_key)
            .with_context(|| format!("read {}", self.public_key.display()))
    }
}

/// Keypair generation, enabling test doubles.
#[allow(async_fn_in_trait)]
pub trait KeyGenerator {
    /// Generate a fresh keypair and return its on-disk paths.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::KeyGeneration`] if the tool exits non-zero
    /// or the expected files are missing afterwards.
    async fn generate(&self) -> Result<KeyPair>;
}

/// Production generator — shells out to `ssh-keygen`.
pub struct SshKeygen<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> SshKeygen<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl SshKeygen<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(TokioCommandRunner::default())
    }
}

/// Argument list for an unattended 2048-bit RSA generation. The empty `-N`
/// value is passed as a real argv element, never through a shell, so it
/// cannot be eaten by quoting.
fn keygen_args(private_key: &Path) -> Vec<String> {
    vec![
        "-b".into(),
        "2048".into(),
        "-t".into(),
        "rsa".into(),
        "-f".into(),
        private_key.display().to_string(),
        "-q".into(),
        "-N".into(),
        String::new(),
    ]
}

impl<R: CommandRunner> KeyGenerator for SshKeygen<R> {
    async fn generate(&self) -> Result<KeyPair> {
        let dir = tempfile::Builder::new()
            .prefix(KEY_DIR_PREFIX)
            .tempdir()
            .context("creating key directory")?
            .keep();

        let pair = KeyPair::from_private(dir.join(KEY_FILENAME));
        let args = keygen_args(&pair.private_key);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let output = self.runner.run("ssh-keygen", &arg_refs).await?;

        // A non-zero exit is fatal even if the files happen to exist.
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProvisionError::KeyGeneration {
                detail: format!("{} ({})", stderr.trim(), output.status),
            }
            .into());
        }
        for path in [&pair.private_key, &pair.public_key] {
            if !path.is_file() {
                return Err(ProvisionError::KeyGeneration {
                    detail: format!("{} was not created", path.display()),
                }
                .into());
            }
        }
        Ok(pair)
    }
}

//! The provisioning sequence — a strict linear pipeline.
//!
//! Readiness wait, admin bootstrap, login verification, key generation,
//! key registration, SSH smoke test. Each step either hands a value to the
//! next or aborts the run; there is no partial-success state, no retry and
//! no rollback.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::keygen::{KeyGenerator, KeyPair};
use crate::output::OutputContext;
use crate::output::progress;
use crate::rest::{Credentials, GerritHttp};
use crate::sshcheck::SshProbe;

/// Coordinates of the target instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GerritSite {
    pub address: String,
    pub http_port: u16,
    pub ssh_port: u16,
}

impl GerritSite {
    /// Base URL of the REST API.
    #[must_use]
    pub fn http_base(&self) -> String {
        format!("http://{}:{}", self.address, self.http_port)
    }

    /// `user@host` destination for the SSH probe.
    #[must_use]
    pub fn ssh_destination(&self) -> String {
        format!("admin@{}", self.address)
    }
}

/// Everything the surrounding harness needs to drive the instance.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Provisioned {
    pub username: String,
    pub password: String,
    pub private_key: PathBuf,
}

/// Sequence knobs beyond the site coordinates.
pub struct ProvisionOptions {
    /// Use this private key instead of generating one. The sibling `.pub`
    /// file must exist.
    pub private_key: Option<PathBuf>,
    /// Poll the HTTP port before bootstrapping.
    pub wait: bool,
    /// Readiness deadline.
    pub wait_timeout: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            private_key: None,
            wait: true,
            wait_timeout: Duration::from_secs(60),
        }
    }
}

/// Run one step behind a spinner, clearing it on failure.
async fn step<T>(
    ctx: &OutputContext,
    label: &str,
    done: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    let pb = ctx.show_progress().then(|| progress::spinner(label));
    match work.await {
        Ok(value) => {
            if let Some(pb) = pb {
                progress::finish_ok(&pb, done);
            }
            Ok(value)
        }
        Err(e) => {
            if let Some(pb) = pb {
                pb.finish_and_clear();
            }
            Err(e)
        }
    }
}

/// Drive the full sequence against `site`.
///
/// Returns the admin credentials and the private key path. The key's temp
/// directory is left on disk for the caller.
///
/// # Errors
///
/// Returns the first failing step's error; later steps are not attempted.
pub async fn provision(
    site: &GerritSite,
    opts: &ProvisionOptions,
    http: &impl GerritHttp,
    keygen: &impl KeyGenerator,
    probe: &impl SshProbe,
    ctx: &OutputContext,
) -> Result<Provisioned> {
    if opts.wait {
        let deadline = opts.wait_timeout;
        step(ctx, "waiting for Gerrit...", "Gerrit is answering.", async {
            http.wait_ready(deadline)
        })
        .await?;
    }

    let creds = step(
        ctx,
        "creating admin account...",
        "admin account ready.",
        async {
            http.bootstrap_admin()?;
            let creds = Credentials::admin();
            http.verify_login(&creds)?;
            Ok(creds)
        },
    )
    .await?;

    let keys = match &opts.private_key {
        Some(path) => {
            let pair = KeyPair::from_private(path.clone());
            pair.ensure_on_disk()?;
            ctx.info(&format!("using key {}", pair.private_key.display()));
            pair
        }
        None => {
            step(ctx, "generating RSA key...", "RSA key generated.", async {
                keygen.generate().await
            })
            .await?
        }
    };

    step(
        ctx,
        "registering public key...",
        "public key registered.",
        async {
            let public = keys.read_public()?;
            http.upload_ssh_key(&creds, &public)
        },
    )
    .await?;

    step(
        ctx,
        "verifying SSH access...",
        "SSH access verified.",
        async { probe.gerrit_version(site, &keys).await },
    )
    .await?;

    Ok(Provisioned {
        username: creds.username,
        password: creds.password,
        private_key: keys.private_key,
    })
}

/// Serialize the outcome for consumption by surrounding tooling.
///
/// # Errors
///
/// Returns an error if serialization fails (it cannot for this type).
pub fn to_json(provisioned: &Provisioned) -> Result<String> {
    serde_json::to_string_pretty(provisioned).context("serializing provisioned spec")
}

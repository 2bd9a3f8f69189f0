//! Shared mock infrastructure for unit tests.
//!
//! Provides canned [`GerritHttp`], [`KeyGenerator`] and [`SshProbe`]
//! implementations plus a shared call recorder, so each test file doesn't
//! have to re-define the same boilerplate.

#![allow(clippy::expect_used)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use gerritup::error::ProvisionError;
use gerritup::keygen::{KeyGenerator, KeyPair};
use gerritup::output::{OutputContext, Styles};
use gerritup::provision::GerritSite;
use gerritup::rest::{Credentials, GerritHttp};
use gerritup::sshcheck::SshProbe;

/// Records the order in which the doubles were invoked.
pub type CallLog = Arc<Mutex<Vec<&'static str>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn calls(log: &CallLog) -> Vec<&'static str> {
    log.lock().expect("lock").clone()
}

/// Output context that prints nothing (tests run headless).
pub fn silent_output() -> OutputContext {
    OutputContext {
        styles: Styles::default(),
        is_tty: false,
        quiet: true,
    }
}

pub fn localhost() -> GerritSite {
    GerritSite {
        address: "127.0.0.1".into(),
        http_port: 8080,
        ssh_port: 29418,
    }
}

/// Writes a real keypair to a temp directory so `read_public` works, and
/// returns it together with the directory guard keeping the files alive.
pub fn keypair_on_disk() -> (tempfile::TempDir, KeyPair) {
    let dir = tempfile::TempDir::new().expect("tempdir");
    let private = dir.path().join("id_rsa");
    std::fs::write(&private, "fake private key").expect("write private");
    let pair = KeyPair::from_private(private);
    std::fs::write(&pair.public_key, "ssh-rsa AAAA fake@host\n").expect("write public");
    (dir, pair)
}

// ── Gateway double ────────────────────────────────────────────────────────────

/// Gateway that records calls and optionally fails at a named step.
pub struct GatewayDouble {
    pub log: CallLog,
    pub fail_at: Option<&'static str>,
}

impl GatewayDouble {
    pub fn ok(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            fail_at: None,
        }
    }

    pub fn failing_at(log: &CallLog, step: &'static str) -> Self {
        Self {
            log: Arc::clone(log),
            fail_at: Some(step),
        }
    }

    fn record(&self, step: &'static str) -> Result<()> {
        self.log.lock().expect("lock").push(step);
        if self.fail_at == Some(step) {
            return Err(match step {
                "upload_ssh_key" => ProvisionError::KeyRegistration {
                    url: "http://127.0.0.1:8080/a/accounts/self/sshkeys".into(),
                    status: 401,
                }
                .into(),
                _ => ProvisionError::Bootstrap {
                    url: format!("http://127.0.0.1:8080/{step}"),
                    status: 500,
                }
                .into(),
            });
        }
        Ok(())
    }
}

impl GerritHttp for GatewayDouble {
    fn wait_ready(&self, _deadline: Duration) -> Result<()> {
        self.record("wait_ready")
    }

    fn bootstrap_admin(&self) -> Result<()> {
        self.record("bootstrap_admin")
    }

    fn verify_login(&self, creds: &Credentials) -> Result<()> {
        assert_eq!(creds, &Credentials::admin(), "verify must use the fixed pair");
        self.record("verify_login")
    }

    fn upload_ssh_key(&self, _creds: &Credentials, public_key: &[u8]) -> Result<()> {
        assert!(!public_key.is_empty(), "upload must carry the key bytes");
        self.record("upload_ssh_key")
    }
}

// ── Keygen double ─────────────────────────────────────────────────────────────

/// Generator that records the call and hands out a pre-built pair.
pub struct KeygenDouble {
    pub log: CallLog,
    pub pair: KeyPair,
}

impl KeygenDouble {
    pub fn returning(log: &CallLog, pair: KeyPair) -> Self {
        Self {
            log: Arc::clone(log),
            pair,
        }
    }

    /// A generator the test expects never to run.
    pub fn unexpected(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            pair: KeyPair::from_private(PathBuf::from("/nonexistent/id_rsa")),
        }
    }
}

impl KeyGenerator for KeygenDouble {
    async fn generate(&self) -> Result<KeyPair> {
        self.log.lock().expect("lock").push("generate");
        Ok(self.pair.clone())
    }
}

// ── Probe double ──────────────────────────────────────────────────────────────

/// Probe that records the call and optionally rejects the key.
pub struct ProbeDouble {
    pub log: CallLog,
    pub accept: bool,
}

impl ProbeDouble {
    pub fn accepting(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            accept: true,
        }
    }

    pub fn rejecting(log: &CallLog) -> Self {
        Self {
            log: Arc::clone(log),
            accept: false,
        }
    }
}

impl SshProbe for ProbeDouble {
    async fn gerrit_version(&self, _site: &GerritSite, keys: &KeyPair) -> Result<()> {
        self.log.lock().expect("lock").push("gerrit_version");
        if self.accept {
            Ok(())
        } else {
            Err(ProvisionError::KeyVerification {
                command: format!("ssh -i {} admin@127.0.0.1", keys.private_key.display()),
                status: "exit status: 255".into(),
                stdout: String::new(),
                stderr: "Permission denied (publickey).".into(),
            }
            .into())
        }
    }
}

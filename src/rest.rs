//! Gerrit REST gateway — admin bootstrap, login verification, key upload.
//!
//! Gerrit's dev-mode auth contract: the first GET against the magic login
//! URL materializes the admin account (id 1000000) with the fixed
//! `admin`/`secret` pair; everything under `/a/` then requires HTTP Digest
//! authentication with those credentials.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use digest_auth::AuthContext;

use crate::error::ProvisionError;
use crate::provision::GerritSite;

/// First-login URL that makes Gerrit create the admin account. The encoded
/// `#/` fragment and the account id are the server's documented convention —
/// never parameterize them.
pub const BOOTSTRAP_PATH: &str = "/login/%23%2F?account_id=1000000";

/// Authenticated account-info endpoint, used to confirm the bootstrap took.
pub const ACCOUNT_SELF_PATH: &str = "/a/accounts/self";

/// Authenticated endpoint accepting a raw public key as the request body.
pub const SSH_KEYS_PATH: &str = "/a/accounts/self/sshkeys";

/// Per-request timeout. The original tooling had none and could hang
/// forever against a wedged test server.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between readiness probes.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Account credentials returned by the bootstrap step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// The fixed pair Gerrit binds to the bootstrapped admin account.
    #[must_use]
    pub fn admin() -> Self {
        Self {
            username: "admin".to_string(),
            password: "secret".to_string(),
        }
    }
}

/// HTTP operations against a Gerrit instance, enabling test doubles.
pub trait GerritHttp {
    /// Poll the HTTP port until the server answers at all (any status
    /// counts, including 4xx/5xx) or `deadline` elapses.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::NotReady`] when the deadline elapses.
    fn wait_ready(&self, deadline: Duration) -> Result<()>;

    /// GET the first-login URL, creating the admin account server-side.
    /// Idempotent: once the account exists the request is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Bootstrap`] on a non-success status.
    fn bootstrap_admin(&self) -> Result<()>;

    /// GET `/a/accounts/self` with Digest auth to prove the account works.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Bootstrap`] on a non-success status.
    fn verify_login(&self, creds: &Credentials) -> Result<()>;

    /// POST the raw public key bytes to `/a/accounts/self/sshkeys`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::KeyRegistration`] on a non-success status;
    /// a 401 is recognizable via [`ProvisionError::is_auth_failure`].
    fn upload_ssh_key(&self, creds: &Credentials, public_key: &[u8]) -> Result<()>;
}

/// Production gateway — blocking HTTP with per-request timeouts.
pub struct RestClient {
    agent: ureq::Agent,
    base: String,
}

impl RestClient {
    /// Create a gateway for the given instance. Connections carry no
    /// cookies or other state between calls.
    #[must_use]
    pub fn new(site: &GerritSite) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            base: site.http_base(),
        }
    }

    fn url(&self, tail: &str) -> String {
        format!("{}{tail}", self.base)
    }
}

impl GerritHttp for RestClient {
    fn wait_ready(&self, deadline: Duration) -> Result<()> {
        let url = self.url("/");
        let started = Instant::now();
        loop {
            match self.agent.get(&url).call() {
                // Any HTTP answer means the server is listening.
                Ok(_) | Err(ureq::Error::Status(_, _)) => return Ok(()),
                Err(_) if started.elapsed() < deadline => std::thread::sleep(POLL_INTERVAL),
                Err(_) => {
                    return Err(ProvisionError::NotReady {
                        url,
                        waited_secs: deadline.as_secs(),
                    }
                    .into());
                }
            }
        }
    }

    fn bootstrap_admin(&self) -> Result<()> {
        let url = self.url(BOOTSTRAP_PATH);
        match self.agent.get(&url).call() {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, _)) => {
                Err(ProvisionError::Bootstrap { url, status }.into())
            }
            Err(e) => Err(e).with_context(|| format!("GET {url}")),
        }
    }

    fn verify_login(&self, creds: &Credentials) -> Result<()> {
        let url = self.url(ACCOUNT_SELF_PATH);
        let first = self.agent.get(&url).call();
        match first {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(401, resp)) => {
                let auth = AuthContext::new(
                    creds.username.as_str(),
                    creds.password.as_str(),
                    ACCOUNT_SELF_PATH,
                );
                let header = answer_challenge(&resp, &auth, &url)?;
                match self.agent.get(&url).set("Authorization", &header).call() {
                    Ok(_) => Ok(()),
                    Err(ureq::Error::Status(status, _)) => {
                        Err(ProvisionError::Bootstrap { url, status }.into())
                    }
                    Err(e) => Err(e).with_context(|| format!("GET {url}")),
                }
            }
            Err(ureq::Error::Status(status, _)) => {
                Err(ProvisionError::Bootstrap { url, status }.into())
            }
            Err(e) => Err(e).with_context(|| format!("GET {url}")),
        }
    }

    fn upload_ssh_key(&self, creds: &Credentials, public_key: &[u8]) -> Result<()> {
        let url = self.url(SSH_KEYS_PATH);
        // The unauthenticated attempt both carries the body (the server
        // discards it) and collects the digest challenge.
        let first = self.agent.post(&url).send_bytes(public_key);
        match first {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(401, resp)) => {
                let auth = AuthContext::new_post(
                    creds.username.as_str(),
                    creds.password.as_str(),
                    SSH_KEYS_PATH,
                    Some(public_key),
                );
                let header = answer_challenge(&resp, &auth, &url)?;
                match self
                    .agent
                    .post(&url)
                    .set("Authorization", &header)
                    .send_bytes(public_key)
                {
                    Ok(_) => Ok(()),
                    Err(ureq::Error::Status(status, _)) => {
                        Err(ProvisionError::KeyRegistration { url, status }.into())
                    }
                    Err(e) => Err(e).with_context(|| format!("POST {url}")),
                }
            }
            Err(ureq::Error::Status(status, _)) => {
                Err(ProvisionError::KeyRegistration { url, status }.into())
            }
            Err(e) => Err(e).with_context(|| format!("POST {url}")),
        }
    }
}

/// Compute the `Authorization` header answering a digest challenge.
fn answer_challenge(resp: &ureq::Response, auth: &AuthContext<'_>, url: &str) -> Result<String> {
    let challenge = resp
        .header("WWW-Authenticate")
        .with_context(|| format!("401 without WWW-Authenticate challenge for {url}"))?;
    let mut prompt =
        digest_auth::parse(challenge).with_context(|| format!("unparseable challenge for {url}"))?;
    let answer = prompt
        .respond(auth)
        .with_context(|| format!("computing digest response for {url}"))?;
    Ok(answer.to_header_string())
}

//! `gerritup provision` — bootstrap the admin account and register a key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use crate::keygen::SshKeygen;
use crate::output::OutputContext;
use crate::provision::{self, GerritSite, ProvisionOptions, Provisioned};
use crate::rest::RestClient;
use crate::sshcheck::SshCli;

/// Arguments for the provision command.
#[derive(Args)]
pub struct ProvisionArgs {
    /// Address the Gerrit instance listens on
    #[arg(long, default_value = "127.0.0.1")]
    pub address: String,

    /// HTTP (REST API) port
    #[arg(long, default_value_t = 8080)]
    pub http_port: u16,

    /// SSH port
    #[arg(long, default_value_t = 29418)]
    pub ssh_port: u16,

    /// Use this private key instead of generating one (expects a sibling .pub file)
    #[arg(long, short = 'i')]
    pub private_key: Option<PathBuf>,

    /// Seconds to wait for the HTTP port to start answering
    #[arg(long, default_value_t = 60)]
    pub wait_timeout: u64,

    /// Do not wait for the instance; bootstrap immediately
    #[arg(long)]
    pub no_wait: bool,

    /// Write the provisioned spec as JSON to this file
    #[arg(long)]
    pub out: Option<PathBuf>,
}

/// Run `gerritup provision`.
///
/// # Errors
///
/// Returns an error if any provisioning step fails or the output file
/// cannot be written.
pub async fn run(args: &ProvisionArgs, ctx: &OutputContext, json: bool) -> Result<()> {
    let site = GerritSite {
        address: args.address.clone(),
        http_port: args.http_port,
        ssh_port: args.ssh_port,
    };
    let opts = ProvisionOptions {
        private_key: args.private_key.clone(),
        wait: !args.no_wait,
        wait_timeout: Duration::from_secs(args.wait_timeout),
    };

    let http = RestClient::new(&site);
    let keygen = SshKeygen::default_runner();
    let probe = SshCli::default_runner();

    let provisioned = provision::provision(&site, &opts, &http, &keygen, &probe, ctx).await?;

    if let Some(path) = &args.out {
        write_spec(path, &provisioned)?;
    }

    if json {
        println!("{}", provision::to_json(&provisioned)?);
    } else {
        print_summary(&site, &provisioned, ctx);
    }
    Ok(())
}

/// Write the provisioned spec to disk, creating parent directories.
fn write_spec(path: &Path, provisioned: &Provisioned) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create dir {}", parent.display()))?;
    }
    std::fs::write(path, provision::to_json(provisioned)?)
        .with_context(|| format!("write {}", path.display()))
}

fn print_summary(site: &GerritSite, provisioned: &Provisioned, ctx: &OutputContext) {
    if ctx.quiet {
        return;
    }
    ctx.success("Gerrit instance provisioned.");
    ctx.kv("Username   ", &provisioned.username);
    ctx.kv("Password   ", &provisioned.password);
    ctx.kv("Private key", &provisioned.private_key.display().to_string());
    ctx.kv(
        "Try        ",
        &format!(
            "ssh -i {} -p {} {} gerrit version",
            provisioned.private_key.display(),
            site.ssh_port,
            site.ssh_destination(),
        ),
    );
}

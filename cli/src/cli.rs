pub mod opts;

use anyhow::{bail, Context, Result};
use colored::*;
use log::*;
use prettytable::{cell, row, Table};
use serde_json::json;
use std::io;
use testrunner_lib::{Config, Role, Terraform};

use opts::{Info, Provision, Testrunner};

pub(crate) fn terraform(opts: &Testrunner) -> Result<Terraform> {
    let mut conf = Config::load(&opts.vars)
        .with_context(|| format!("failed to load {}", opts.vars.display()))?;
    if let Some(platform) = &opts.platform {
        conf.platform = platform.clone();
    }
    Ok(Terraform::from_config(conf)?)
}

pub(crate) fn provision(sub: &Provision, mut tf: Terraform) -> Result<()> {
    tf.provision(sub.master_count, sub.worker_count)
        .context("provisioning failed")?;
    info!("{}", "Provisioning finished".green());
    Ok(())
}

pub(crate) fn gather_logs(mut tf: Terraform) -> Result<()> {
    let log_dir = tf.config().log_dir();
    if tf.gather_logs()? {
        bail!("some logs could not be collected into {}", log_dir.display());
    }
    info!("logs collected into {}", log_dir.display());
    Ok(())
}

pub(crate) fn cleanup(mut tf: Terraform) -> Result<()> {
    tf.cleanup().context("cleanup was incomplete")?;
    info!("{}", "Cleanup finished".green());
    Ok(())
}

pub(crate) fn info(sub: &Info, mut tf: Terraform) -> Result<()> {
    let lb = tf.lb_address()?;
    let mut nodes = Vec::new();
    for role in Role::ALL {
        for ip in tf.role_addresses(role)? {
            nodes.push((role, ip));
        }
    }

    if sub.json {
        let stdout = io::stdout();
        let handle = stdout.lock();
        let masters: Vec<&str> = nodes
            .iter()
            .filter(|(role, _)| *role == Role::Master)
            .map(|(_, ip)| ip.as_str())
            .collect();
        let workers: Vec<&str> = nodes
            .iter()
            .filter(|(role, _)| *role == Role::Worker)
            .map(|(_, ip)| ip.as_str())
            .collect();
        serde_json::to_writer_pretty(
            handle,
            &json!({
                "platform": tf.platform().name(),
                "load_balancer": lb,
                "masters": masters,
                "workers": workers,
            }),
        )?;
    } else {
        let mut table = Table::new();
        table.add_row(row!["Role", "IP"]);
        table.add_row(row!["load-balancer", lb]);
        for (role, ip) in nodes {
            table.add_row(row![role, ip]);
        }
        table.printstd();
    }

    Ok(())
}

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::doc_markdown, clippy::if_not_else, clippy::non_ascii_literal)]

use hostsweep::address::{get_resolver, parse_subnet, Subnet};
use hostsweep::errors::ScanError;
use hostsweep::input::Opts;
use hostsweep::interface::{
    candidate_interfaces, find_interface, first_ipv4_subnet, ipv4_networks, read_choice,
};
use hostsweep::report::{format_result, ReportStyle};
use hostsweep::scanner::{ScanOutcome, Scanner};
use hostsweep::{detail, output, warning};

use anyhow::{Context, Result};
use futures::StreamExt;
use std::io::{self, Write};
use std::pin::pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use log::{debug, info};

// Average value for Ubuntu
#[cfg(unix)]
const DEFAULT_FILE_DESCRIPTORS_LIMIT: u64 = 1024;
// Each in-flight lookup holds one UDP socket; a /24 needs no more than this.
#[cfg(unix)]
const AVERAGE_BATCH_SIZE: u64 = 256;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        warning!(format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let mut opts: Opts = Opts::read();
    let config = opts.load_config()?;
    opts.merge(&config);

    debug!("Main() `opts` arguments are {:?}", opts);

    #[cfg(unix)]
    let batch_size = infer_batch_size(&opts, adjust_ulimit_size(&opts));

    #[cfg(not(unix))]
    let batch_size = opts.batch_size;

    let subnet = select_subnet(&opts)?;
    let hosts = subnet
        .hosts()
        .with_context(|| format!("Cannot scan {subnet}"))?;

    output!(
        "Hosts found in the given IP range:".blue(),
        opts.greppable,
        opts.accessible
    );

    let resolver = get_resolver(&opts.resolver).await?;
    let scanner = Scanner::new(
        Arc::new(resolver),
        batch_size,
        Duration::from_millis(opts.timeout),
        opts.tries,
        opts.scan_timeout.map(Duration::from_millis),
    );
    let style = ReportStyle {
        greppable: opts.greppable,
        accessible: opts.accessible,
        show_failed: opts.show_failed,
    };

    let started = Instant::now();
    let total = hosts.len();
    let (mut named, mut failed) = (0usize, 0usize);

    let mut results = pin!(scanner.stream(hosts));
    while let Some(result) = results.next().await {
        match result.outcome {
            ScanOutcome::Resolved(_) => named += 1,
            ScanOutcome::Failed => failed += 1,
            ScanOutcome::NoName => {}
        }
        if let Some(line) = format_result(&result, &style) {
            println!("{line}");
        }
    }

    info!(
        "Scanned {} addresses of {} in {:?}: {} named, {} without answer",
        total,
        subnet,
        started.elapsed(),
        named,
        failed
    );
    Ok(())
}

/// Subnet given with --cidr, or the one of the chosen interface.
fn select_subnet(opts: &Opts) -> Result<Subnet> {
    if let Some(cidr) = &opts.cidr {
        return Ok(parse_subnet(cidr)?);
    }

    let interfaces = candidate_interfaces();
    if interfaces.is_empty() {
        return Err(ScanError::NoInterface("No network interface found".to_owned()).into());
    }

    let iface = match &opts.interface {
        Some(name) => find_interface(&interfaces, name)?,
        None => {
            // The menu is interactive, so it is printed even in greppable mode.
            detail!("Select a network interface:", false, opts.accessible);
            for (i, iface) in interfaces.iter().enumerate() {
                println!("{}. {}", i + 1, iface.name);
            }
            print!("Enter the number of the interface: ");
            io::stdout().flush()?;

            let choice = read_choice(io::stdin().lock(), interfaces.len())?;
            &interfaces[choice]
        }
    };

    detail!(
        format!("IP addresses for interface {}:", iface.name),
        opts.greppable,
        opts.accessible
    );
    for network in ipv4_networks(&iface.ips) {
        output!(network, opts.greppable, opts.accessible);
    }

    Ok(first_ipv4_subnet(&iface.ips)?)
}

#[cfg(unix)]
fn adjust_ulimit_size(opts: &Opts) -> u64 {
    use rlimit::Resource;

    if let Some(limit) = opts.ulimit {
        if Resource::NOFILE.set(limit, limit).is_ok() {
            detail!(
                format!("Automatically increasing ulimit value to {limit}."),
                opts.greppable,
                opts.accessible
            );
        } else {
            warning!(
                "ERROR. Failed to set ulimit value.",
                opts.greppable,
                opts.accessible
            );
        }
    }

    match Resource::NOFILE.get() {
        Ok((soft, _)) => soft,
        Err(e) => {
            debug!("Could not read the file limit: {e}");
            DEFAULT_FILE_DESCRIPTORS_LIMIT
        }
    }
}

#[cfg(unix)]
fn infer_batch_size(opts: &Opts, ulimit: u64) -> usize {
    let mut batch_size = opts.batch_size as u64;

    // Adjust the batch size when the ulimit value is lower than the desired batch size
    if ulimit < batch_size {
        warning!("File limit is lower than the batch size. Consider upping with --ulimit.",
            opts.greppable, opts.accessible
        );

        if ulimit < AVERAGE_BATCH_SIZE {
            info!("Halving batch_size because ulimit is smaller than average batch size");
            batch_size = ulimit / 2;
        } else {
            batch_size = ulimit - 100;
        }
    }

    usize::try_from(batch_size.max(1)).unwrap_or(usize::MAX)
}

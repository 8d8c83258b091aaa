//! This crate exposes the internal functionality of the hostsweep subnet
//! scanner.
//!
//! hostsweep takes one IPv4 subnet, usually the one of a local network
//! interface, and looks every usable address of it up with reverse DNS. The
//! hosts that have a name are reported as soon as their lookup answers.
//!
//! ## Architecture Overview
//!
//! 1. **Subnet selection**: [`interface`] picks a local interface (or the user
//!    gives a CIDR) and yields a [`Subnet`](crate::address::Subnet).
//! 2. **Range enumeration**: [`address::enumerate`] lists the usable hosts,
//!    network and broadcast addresses excluded.
//! 3. **Scanning**: [`Scanner`](crate::scanner::Scanner) looks each address
//!    up in its own task, at most `batch_size` at a time, retrying failed
//!    lookups a few times.
//! 4. **Reporting**: [`report`] turns every
//!    [`ScanResult`](crate::scanner::ScanResult) into a console line.
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::{sync::Arc, time::Duration};
//!
//! use hostsweep::address::{get_resolver, parse_subnet};
//! use hostsweep::scanner::Scanner;
//!
//! # async fn scan() -> Result<(), Box<dyn std::error::Error>> {
//! let subnet = parse_subnet("192.168.1.0/24")?;
//! let resolver = get_resolver(&None).await?;
//!
//! let scanner = Scanner::new(
//!     Arc::new(resolver),         // Reverse lookup implementation
//!     64,                         // Lookups in flight at once
//!     Duration::from_millis(1500), // Timeout of one attempt
//!     3,                          // Attempts per address
//!     None,                       // No bound on the whole scan
//! );
//!
//! for result in scanner.run(subnet.hosts()?).await {
//!     println!("{:?}", result);
//! }
//! # Ok(())
//! # }
//! ```
#![allow(clippy::needless_doctest_main)]

pub mod tui;

pub mod errors;

pub mod input;

pub mod address;

pub mod interface;

pub mod scanner;

pub mod report;

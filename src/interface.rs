//! Picks the local network interface, and from it the subnet, to scan.
use std::io::BufRead;

use log::debug;
use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::IpNetwork;

use crate::address::Subnet;
use crate::errors::ScanError;

/// Every interface except loopback ones.
pub fn candidate_interfaces() -> Vec<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .collect()
}

/// Finds an interface by name.
pub fn find_interface<'a>(
    interfaces: &'a [NetworkInterface],
    name: &str,
) -> Result<&'a NetworkInterface, ScanError> {
    interfaces
        .iter()
        .find(|iface| iface.name == name)
        .ok_or_else(|| ScanError::Selection(format!("Interface {name:?} not found")))
}

/// Turns the answer typed at the interface menu into an index.
/// Choices are numbered from 1.
pub fn parse_choice(line: &str, count: usize) -> Result<usize, ScanError> {
    match line.trim().parse::<usize>() {
        Ok(choice) if (1..=count).contains(&choice) => Ok(choice - 1),
        _ => Err(ScanError::Selection("Invalid choice".to_owned())),
    }
}

/// Reads one menu answer from `input`.
pub fn read_choice<R: BufRead>(mut input: R, count: usize) -> Result<usize, ScanError> {
    let mut line = String::new();
    input
        .read_line(&mut line)
        .map_err(|e| ScanError::Selection(format!("Could not read choice: {e}")))?;
    parse_choice(&line, count)
}

/// The IPv4 networks configured on an interface, in their configured order.
pub fn ipv4_networks(ips: &[IpNetwork]) -> Vec<IpNetwork> {
    ips.iter().copied().filter(IpNetwork::is_ipv4).collect()
}

/// The subnet of the first IPv4 network configured on an interface.
pub fn first_ipv4_subnet(ips: &[IpNetwork]) -> Result<Subnet, ScanError> {
    let network = ips
        .iter()
        .find_map(|ip| match ip {
            IpNetwork::V4(net) => Some(net),
            IpNetwork::V6(_) => None,
        })
        .ok_or_else(|| ScanError::NoInterface("No IPv4 Address Found!".to_owned()))?;

    debug!("Scanning around {}", network);
    Subnet::with_prefix(network.ip(), network.prefix())
}

//! Provides functions to turn an address and mask into the hosts of its subnet,
//! and to build the DNS resolver used for reverse lookups.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::ops::Range;
use std::str::FromStr;

use cidr_utils::cidr::Ipv4Inet;
use hickory_resolver::{
    config::{NameServerConfig, Protocol, ResolverConfig, ResolverOpts},
    TokioAsyncResolver,
};
use log::debug;
use tokio::{fs, io};

use crate::errors::ScanError;

/// An IPv4 subnet, kept as its network address and prefix length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subnet {
    network: Ipv4Addr,
    prefix: u8,
}

impl Subnet {
    /// Builds the subnet containing `address` under `mask`.
    pub fn new(address: Ipv4Addr, mask: Ipv4Addr) -> Result<Self, ScanError> {
        let prefix = mask_to_prefix(mask)?;
        let network = Ipv4Addr::from(u32::from(address) & u32::from(mask));
        Ok(Self { network, prefix })
    }

    /// Builds the subnet containing `address` under a prefix length.
    pub fn with_prefix(address: Ipv4Addr, prefix: u8) -> Result<Self, ScanError> {
        Self::new(address, prefix_to_mask(prefix)?)
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn mask(&self) -> Ipv4Addr {
        Ipv4Addr::from(mask_bits(self.prefix))
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.network) | !mask_bits(self.prefix))
    }

    /// All usable host addresses of this subnet, see [`enumerate`].
    pub fn hosts(&self) -> Result<HostRange, ScanError> {
        enumerate(self.network, self.mask())
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

fn mask_bits(prefix: u8) -> u32 {
    // Shifting a u32 by 32 overflows, /0 is special cased.
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

/// Converts a prefix length into its dotted mask, `24` becomes `255.255.255.0`.
pub fn prefix_to_mask(prefix: u8) -> Result<Ipv4Addr, ScanError> {
    if prefix > 32 {
        return Err(ScanError::InvalidRange(format!(
            "prefix /{prefix} is longer than 32 bits"
        )));
    }
    Ok(Ipv4Addr::from(mask_bits(prefix)))
}

/// Converts a dotted mask into its prefix length.
///
/// Only contiguous masks (ones followed by zeros) are accepted.
pub fn mask_to_prefix(mask: Ipv4Addr) -> Result<u8, ScanError> {
    let bits = u32::from(mask);
    let ones = bits.leading_ones();
    if ones + bits.trailing_zeros() != 32 {
        return Err(ScanError::InvalidRange(format!(
            "{mask} is not a contiguous subnet mask"
        )));
    }
    Ok(ones as u8)
}

/// Parses `a.b.c.d/n` text into its subnet. Host bits may be set.
///
/// ```rust
/// # use hostsweep::address::parse_subnet;
/// let subnet = parse_subnet("192.168.1.77/24").unwrap();
/// assert_eq!(subnet.to_string(), "192.168.1.0/24");
/// ```
pub fn parse_subnet(input: &str) -> Result<Subnet, ScanError> {
    let inet = Ipv4Inet::from_str(input.trim())
        .map_err(|e| ScanError::InvalidRange(format!("{input:?} is not an IPv4 CIDR: {e}")))?;
    Subnet::with_prefix(inet.address(), inet.network_length())
}

/// Usable hosts of a subnet, produced one at a time in ascending order.
///
/// The whole address is one `u32` counter, so x.x.x.255 carries into the
/// next octet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRange {
    inner: Range<u32>,
}

impl Iterator for HostRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        self.inner.next().map(Ipv4Addr::from)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl DoubleEndedIterator for HostRange {
    fn next_back(&mut self) -> Option<Ipv4Addr> {
        self.inner.next_back().map(Ipv4Addr::from)
    }
}

impl ExactSizeIterator for HostRange {}

/// Lists every usable host of the subnet `address` belongs to under `mask`,
/// in ascending order, without the network and broadcast addresses.
///
/// Nothing is allocated up front; even a `/0` is walked lazily. Subnets with
/// fewer than two usable hosts (`/31`, `/32`) are rejected with
/// [`ScanError::InvalidRange`].
///
/// ```rust
/// # use std::net::Ipv4Addr;
/// # use hostsweep::address::enumerate;
/// let hosts: Vec<_> = enumerate(Ipv4Addr::new(10, 0, 0, 0), Ipv4Addr::new(255, 255, 255, 252))
///     .unwrap()
///     .collect();
/// assert_eq!(hosts, [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]);
/// ```
pub fn enumerate(address: Ipv4Addr, mask: Ipv4Addr) -> Result<HostRange, ScanError> {
    let prefix = mask_to_prefix(mask)?;
    if prefix >= 31 {
        return Err(ScanError::InvalidRange(format!(
            "/{prefix} has no usable host addresses"
        )));
    }

    let mask = u32::from(mask);
    let network = u32::from(address) & mask;
    let broadcast = network | !mask;

    debug!(
        "Subnet {}/{} ends at {}",
        Ipv4Addr::from(network),
        prefix,
        Ipv4Addr::from(broadcast)
    );

    // Both ends are inside the u32 range since prefix <= 30.
    Ok(HostRange {
        inner: network + 1..broadcast,
    })
}

/// Derive a DNS resolver.
///
/// 1. if the `resolver` parameter has been set:
///     1. assume the parameter is a path and attempt to read IPs.
///     2. parse the input as a comma-separated list of IPs.
/// 2. if `resolver` is not set:
///    1. attempt to derive a resolver from the system config. (e.g.
///       `/etc/resolv.conf` on *nix).
///    2. finally, build a CloudFlare-based resolver.
///
/// The resolver makes a single attempt per query; retrying is left to the
/// scanner. A `resolver` value without a single usable IP is an error rather
/// than a resolver that can never answer.
pub async fn get_resolver(resolver: &Option<String>) -> Result<TokioAsyncResolver, ScanError> {
    let mut opts = ResolverOpts::default();
    opts.attempts = 1;

    match resolver {
        Some(r) => {
            let mut config = ResolverConfig::new();
            for ip in resolver_ips(r).await? {
                debug!("Using name server {ip}");
                config.add_name_server(NameServerConfig::new(
                    SocketAddr::new(ip, 53),
                    Protocol::Udp,
                ));
            }
            Ok(TokioAsyncResolver::tokio(config, opts))
        }
        None => match hickory_resolver::system_conf::read_system_conf() {
            Ok((config, mut system_opts)) => {
                system_opts.attempts = 1;
                Ok(TokioAsyncResolver::tokio(config, system_opts))
            }
            Err(e) => {
                debug!("No system resolver configuration ({e}), falling back to Cloudflare");
                Ok(TokioAsyncResolver::tokio(ResolverConfig::cloudflare(), opts))
            }
        },
    }
}

/// Name server IPs from a file, or else from a comma-separated list.
async fn resolver_ips(resolver: &str) -> Result<Vec<IpAddr>, ScanError> {
    let ips = match read_resolver_from_file(resolver).await {
        Ok(ips) => ips,
        Err(_) => resolver
            .split(',')
            .filter_map(|r| IpAddr::from_str(r.trim()).ok())
            .collect::<Vec<_>>(),
    };

    if ips.is_empty() {
        return Err(ScanError::NoResolver(format!(
            "No usable DNS resolver IP in {resolver:?}"
        )));
    }
    Ok(ips)
}

/// Parses and input file of IPs for use in DNS resolution.
async fn read_resolver_from_file(path: &str) -> io::Result<Vec<IpAddr>> {
    let ips = fs::read_to_string(path)
        .await?
        .lines()
        .filter_map(|line| IpAddr::from_str(line.trim()).ok())
        .collect();

    Ok(ips)
}

#[cfg(test)]
mod tests {
    use super::{
        enumerate, get_resolver, mask_to_prefix, parse_subnet, prefix_to_mask,
        read_resolver_from_file, resolver_ips, Subnet,
    };
    use crate::errors::ScanError;
    use parameterized::parameterized;
    use std::net::{IpAddr, Ipv4Addr};

    fn hosts(address: Ipv4Addr, mask: Ipv4Addr) -> Vec<Ipv4Addr> {
        enumerate(address, mask).unwrap().collect()
    }

    #[parameterized(prefix = { 16, 20, 23, 24, 27, 29, 30 })]
    fn enumerate_counts_usable_hosts(prefix: u8) {
        let address = Ipv4Addr::new(10, 20, 30, 40);
        let mask = prefix_to_mask(prefix).unwrap();
        let hosts = hosts(address, mask);

        assert_eq!(hosts.len(), (1usize << (32 - prefix)) - 2);
        assert_eq!(enumerate(address, mask).unwrap().len(), hosts.len());

        let subnet = Subnet::new(address, mask).unwrap();
        let network = u32::from(subnet.network());
        let broadcast = u32::from(subnet.broadcast());
        assert!(hosts.windows(2).all(|w| u32::from(w[0]) < u32::from(w[1])));
        assert!(hosts
            .iter()
            .all(|h| network < u32::from(*h) && u32::from(*h) < broadcast));
    }

    #[test]
    fn enumerate_class_c() {
        let hosts = hosts(
            Ipv4Addr::new(192, 168, 1, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        );

        assert_eq!(hosts.len(), 254);
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 0)));
        assert!(!hosts.contains(&Ipv4Addr::new(192, 168, 1, 255)));
    }

    #[test]
    fn enumerate_slash_30() {
        let hosts = hosts(
            Ipv4Addr::new(10, 0, 0, 0),
            Ipv4Addr::new(255, 255, 255, 252),
        );

        assert_eq!(hosts, [Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn enumerate_ignores_host_bits() {
        let from_network = hosts(
            Ipv4Addr::new(172, 16, 5, 0),
            Ipv4Addr::new(255, 255, 255, 0),
        );
        let from_host = hosts(
            Ipv4Addr::new(172, 16, 5, 99),
            Ipv4Addr::new(255, 255, 255, 0),
        );

        assert_eq!(from_network, from_host);
    }

    #[test]
    fn enumerate_is_idempotent() {
        let address = Ipv4Addr::new(192, 168, 7, 12);
        let mask = Ipv4Addr::new(255, 255, 255, 224);

        assert_eq!(hosts(address, mask), hosts(address, mask));
    }

    #[test]
    fn enumerate_carries_across_octets() {
        let hosts = hosts(
            Ipv4Addr::new(192, 168, 0, 0),
            Ipv4Addr::new(255, 255, 254, 0),
        );

        assert_eq!(hosts.len(), 510);
        let carry = hosts
            .iter()
            .position(|h| *h == Ipv4Addr::new(192, 168, 0, 255))
            .unwrap();
        assert_eq!(hosts[carry + 1], Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn enumerate_top_of_address_space() {
        let hosts = hosts(
            Ipv4Addr::new(255, 255, 255, 250),
            Ipv4Addr::new(255, 255, 255, 248),
        );

        assert_eq!(hosts.len(), 6);
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(255, 255, 255, 254)));
    }

    #[test]
    fn enumerate_whole_address_space_lazily() {
        let mut range = enumerate(Ipv4Addr::new(0, 0, 0, 0), Ipv4Addr::new(0, 0, 0, 0)).unwrap();

        assert_eq!(range.len(), (1usize << 32) - 2);
        assert_eq!(range.next(), Some(Ipv4Addr::new(0, 0, 0, 1)));
        assert_eq!(range.next_back(), Some(Ipv4Addr::new(255, 255, 255, 254)));
    }

    #[test]
    fn enumerate_half_address_space_lazily() {
        let mut range = enumerate(Ipv4Addr::new(200, 1, 2, 3), prefix_to_mask(1).unwrap()).unwrap();

        assert_eq!(range.len(), (1usize << 31) - 2);
        assert_eq!(range.next(), Some(Ipv4Addr::new(128, 0, 0, 1)));
        assert_eq!(range.next_back(), Some(Ipv4Addr::new(255, 255, 255, 254)));
    }

    #[parameterized(prefix = { 31, 32 })]
    fn enumerate_rejects_tiny_subnets(prefix: u8) {
        let result = enumerate(Ipv4Addr::new(10, 0, 0, 1), prefix_to_mask(prefix).unwrap());

        assert!(matches!(result, Err(ScanError::InvalidRange(_))));
    }

    #[test]
    fn enumerate_rejects_non_contiguous_mask() {
        let result = enumerate(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(255, 0, 255, 0),
        );

        assert!(matches!(result, Err(ScanError::InvalidRange(_))));
    }

    #[test]
    fn mask_prefix_conversions() {
        assert_eq!(prefix_to_mask(0), Ok(Ipv4Addr::new(0, 0, 0, 0)));
        assert_eq!(prefix_to_mask(24), Ok(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(prefix_to_mask(32), Ok(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(prefix_to_mask(33).is_err());

        assert_eq!(mask_to_prefix(Ipv4Addr::new(0, 0, 0, 0)), Ok(0));
        assert_eq!(mask_to_prefix(Ipv4Addr::new(255, 255, 240, 0)), Ok(20));
        assert_eq!(mask_to_prefix(Ipv4Addr::new(255, 255, 255, 255)), Ok(32));
        assert!(mask_to_prefix(Ipv4Addr::new(0, 255, 255, 255)).is_err());
    }

    #[test]
    fn parse_subnet_masks_host_bits() {
        let subnet = parse_subnet("203.0.113.77/29").unwrap();

        assert_eq!(subnet.network(), Ipv4Addr::new(203, 0, 113, 72));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(203, 0, 113, 79));
        assert_eq!(subnet.prefix(), 29);
        assert_eq!(subnet.hosts().unwrap().len(), 6);
    }

    #[parameterized(input = { "not_an_ip", "10.0.0.0/33", "::1/64", "300.1.1.1/24" })]
    fn parse_subnet_rejects_garbage(input: &str) {
        assert!(matches!(parse_subnet(input), Err(ScanError::InvalidRange(_))));
    }

    #[tokio::test]
    async fn resolver_file_missing() {
        assert!(read_resolver_from_file("fixtures/does_not_exist.txt")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn resolver_list_without_ips_is_rejected() {
        let typo = Some("192.168.1.1.1,dns.local".to_owned());

        assert!(matches!(
            resolver_ips(typo.as_deref().unwrap()).await,
            Err(ScanError::NoResolver(_))
        ));
        assert!(matches!(get_resolver(&typo).await, Err(ScanError::NoResolver(_))));
    }

    #[tokio::test]
    async fn resolver_list_skips_bad_entries() {
        let ips = resolver_ips("192.168.1.1.1, 1.1.1.1,9.9.9.9").await.unwrap();

        assert_eq!(
            ips,
            [
                IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1)),
                IpAddr::V4(Ipv4Addr::new(9, 9, 9, 9))
            ]
        );
        assert!(get_resolver(&Some("1.1.1.1".to_owned())).await.is_ok());
    }
}

//! Loopback address resolution
//!
//! Local-only listeners must bind each loopback address separately: IPv4
//! and IPv6 loopback are distinct addresses requiring distinct sockets.
//! Availability is probed with a throwaway ephemeral bind, so hosts without
//! an IPv6 stack simply yield a single-address set.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, TcpListener};
use tracing::debug;

/// Resolve the set of bindable loopback addresses, IPv4 first.
/// Never empty on a functioning host; the caller treats an empty set as a
/// configuration error.
pub fn loopback_addresses() -> Vec<IpAddr> {
    let candidates = [
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(Ipv6Addr::LOCALHOST),
    ];

    candidates
        .into_iter()
        .filter(|addr| {
            let bindable = TcpListener::bind((*addr, 0)).is_ok();
            if !bindable {
                debug!("loopback address {} not bindable, skipping", addr);
            }
            bindable
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolves_at_least_ipv4_loopback() {
        let addrs = loopback_addresses();
        assert!(addrs.contains(&IpAddr::V4(Ipv4Addr::LOCALHOST)));
    }

    #[test]
    fn test_all_resolved_addresses_are_loopback() {
        for addr in loopback_addresses() {
            assert!(addr.is_loopback(), "{addr} is not a loopback address");
        }
    }

    #[test]
    fn test_ipv4_sorts_first() {
        let addrs = loopback_addresses();
        assert_eq!(addrs[0], IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}

//! Default-gateway derivation from a tunnel's assigned CIDR (§4.8 "default
//! gateway (derived from config CIDR via network-address + 1)").

use crate::error::{FailoverError, Result};
use ipnetwork::IpNetwork;
use std::net::IpAddr;

/// Given e.g. `10.43.43.2/24`, returns the network's first usable address
/// (`10.43.43.1`), which eduvpn-style WireGuard/OpenVPN configs use as the
/// gateway.
pub fn gateway_from_cidr(cidr: &str) -> Result<IpAddr> {
    let network: IpNetwork = cidr.parse().map_err(|e| FailoverError::InvalidCidr(format!("{cidr}: {e}")))?;

    match network {
        IpNetwork::V4(net) => {
            let network_addr = u32::from(net.network());
            let gateway = network_addr.wrapping_add(1);
            Ok(IpAddr::V4(std::net::Ipv4Addr::from(gateway)))
        }
        IpNetwork::V6(net) => {
            let mut octets = net.network().octets();
            *octets.last_mut().unwrap() = octets.last().unwrap().wrapping_add(1);
            Ok(IpAddr::V6(std::net::Ipv6Addr::from(octets)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_gateway_for_typical_wireguard_cidr() {
        let gw = gateway_from_cidr("10.43.43.2/24").unwrap();
        assert_eq!(gw.to_string(), "10.43.43.1");
    }

    #[test]
    fn derives_gateway_for_slash_32_host_route() {
        // a /32 still has a well-defined "network address"; +1 wraps within
        // the host's own octet, matching how the reference client treats it.
        let gw = gateway_from_cidr("192.168.1.5/32").unwrap();
        assert_eq!(gw.to_string(), "192.168.1.6");
    }

    #[test]
    fn rejects_malformed_cidr() {
        assert!(gateway_from_cidr("not-a-cidr").is_err());
    }
}

// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//==============================================================================
// Imports
//==============================================================================

use crate::runtime::network::consts::{
    ALIAS_DNS_BASE,
    ALIAS_NETMASK,
    DEFAULT_ALIAS_ADDR,
    DEFAULT_ALIAS_NETWORK,
};
use ::std::net::Ipv4Addr;

//==============================================================================
// Structures
//==============================================================================

/// Addresses of the virtual network the guest lives in.
#[derive(Clone, Debug)]
pub struct AliasConfig {
    /// Network of the guest (a /24).
    alias_network: Ipv4Addr,
    /// Address of the virtual gateway.
    alias_addr: Ipv4Addr,
    /// Host address that alias destinations are redirected to.
    loopback_addr: Ipv4Addr,
    /// DNS servers, reachable from the guest at consecutive alias addresses starting at `.3`.
    dns_addrs: Vec<Ipv4Addr>,
}

//==============================================================================
// Associate Functions
//==============================================================================

impl AliasConfig {
    pub fn new(
        alias_network: Option<Ipv4Addr>,
        alias_addr: Option<Ipv4Addr>,
        loopback_addr: Option<Ipv4Addr>,
        dns_addrs: Option<Vec<Ipv4Addr>>,
    ) -> Self {
        let mut config: Self = Self::default();
        if let Some(addr) = alias_network {
            config.alias_network = Ipv4Addr::from(u32::from(addr) & ALIAS_NETMASK);
        }
        if let Some(addr) = alias_addr {
            config.alias_addr = addr;
        }
        if let Some(addr) = loopback_addr {
            config.loopback_addr = addr;
        }
        if let Some(addrs) = dns_addrs {
            config.dns_addrs = addrs;
        }
        config
    }

    pub fn get_alias_network(&self) -> Ipv4Addr {
        self.alias_network
    }

    pub fn get_alias_addr(&self) -> Ipv4Addr {
        self.alias_addr
    }

    pub fn get_loopback_addr(&self) -> Ipv4Addr {
        self.loopback_addr
    }

    pub fn get_dns_addrs(&self) -> &[Ipv4Addr] {
        &self.dns_addrs
    }

    /// Checks whether `addr` belongs to the alias network.
    pub fn is_alias(&self, addr: Ipv4Addr) -> bool {
        (u32::from(addr) & ALIAS_NETMASK) == u32::from(self.alias_network)
    }

    /// Maps a destination inside the alias network to the host address that serves it: a DNS server for the DNS
    /// aliases and the loopback address for everything else. Returns `None` for destinations outside the alias network.
    pub fn resolve_alias(&self, addr: Ipv4Addr) -> Option<Ipv4Addr> {
        if !self.is_alias(addr) {
            return None;
        }
        let last_byte: u8 = addr.octets()[3];
        let dns_index: Option<usize> = last_byte.checked_sub(ALIAS_DNS_BASE).map(usize::from);
        match dns_index.and_then(|index| self.dns_addrs.get(index)) {
            Some(dns) => Some(*dns),
            None => Some(self.loopback_addr),
        }
    }

    /// Address the guest should see for a host-side address: connections from nowhere in particular or from the host
    /// itself appear to come from the gateway.
    pub fn guest_visible(&self, addr: Ipv4Addr) -> Ipv4Addr {
        if addr.is_unspecified() || addr == self.loopback_addr {
            self.alias_addr
        } else {
            addr
        }
    }
}

//==============================================================================
// Trait Implementations
//==============================================================================

impl Default for AliasConfig {
    fn default() -> Self {
        Self {
            alias_network: DEFAULT_ALIAS_NETWORK,
            alias_addr: DEFAULT_ALIAS_ADDR,
            loopback_addr: Ipv4Addr::LOCALHOST,
            dns_addrs: Vec::new(),
        }
    }
}

//==============================================================================
// Unit Tests
//==============================================================================

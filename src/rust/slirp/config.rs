// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    inetstack::protocols::tcp::{
        peer::TcpPeer,
        tos::TosEntry,
    },
    runtime::{
        fail::Fail,
        network::{
            config::{
                AliasConfig,
                TcpConfig,
            },
            consts::{
                MAX_MSS,
                MAX_WINDOW_SCALE,
                MIN_MSS,
                TCPIP_HEADER_SIZE,
            },
            proxy::ProxyManager,
            socket::HostSockets,
            NetworkRuntime,
        },
    },
};
use ::std::{
    fs::File,
    io::Read,
    net::Ipv4Addr,
    ops::Index,
    str::FromStr,
    time::Instant,
};
use ::yaml_rust::{
    Yaml,
    YamlLoader,
};

//======================================================================================================================
// Constants
//======================================================================================================================

// Addresses of the virtual network.
mod slirp_config {
    pub const SECTION_NAME: &str = "slirp";
    pub const ALIAS_NETWORK: &str = "alias_network";
    pub const ALIAS_ADDR: &str = "alias_addr";
    pub const LOOPBACK_ADDR: &str = "loopback_addr";
    pub const DNS_ADDRS: &str = "dns_addrs";
}

// TCP engine tunables.
mod tcp_config {
    pub const SECTION_NAME: &str = "tcp";
    pub const MSS: &str = "mss";
    pub const MTU: &str = "mtu";
    pub const WINDOW_SCALE: &str = "window_scale";
    pub const RECEIVE_BUFFER_SIZE: &str = "receive_buffer_size";
    pub const SEND_BUFFER_SIZE: &str = "send_buffer_size";
    pub const KEEPALIVE: &str = "keepalive";
    pub const MAX_CONNECTIONS: &str = "max_connections";
}

// User emulation rules, a list of `[lport:]fport:emu[:tos]` strings.
mod emulation_config {
    pub const SECTION_NAME: &str = "emulation";
}

//======================================================================================================================
// Structures
//======================================================================================================================

/// Slirp configuration. Every section and option is optional; missing ones take their defaults.
#[derive(Clone, Debug)]
pub struct Config(pub Yaml);

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl Config {
    /// Reads a configuration file into a [Config] object.
    pub fn new(config_path: &str) -> Result<Self, Fail> {
        let mut config_s: String = String::new();
        File::open(config_path)
            .and_then(|mut file| file.read_to_string(&mut config_s))
            .map_err(|e| {
                let cause: String = format!("cannot read {}: {:?}", config_path, e);
                error!("new(): {}", cause);
                Fail::new(libc::EINVAL, &cause)
            })?;
        config_s.parse()
    }

    /// Builds a peer from the configured addresses and tunables, with the user emulation rules installed.
    pub fn new_peer<N: NetworkRuntime, H: HostSockets, P: ProxyManager>(
        &self,
        rt: N,
        host: H,
        proxy: P,
        rng_seed: [u8; 32],
        now: Instant,
    ) -> Result<TcpPeer<N, H, P>, Fail> {
        let mut peer: TcpPeer<N, H, P> =
            TcpPeer::new(rt, host, proxy, self.alias_config()?, self.tcp_config()?, rng_seed, now);
        for entry in self.emulation_entries()? {
            peer.add_emulation(entry);
        }
        Ok(peer)
    }

    fn get_slirp_config(&self) -> Result<&Yaml, Fail> {
        Self::get_optional_subsection(&self.0, slirp_config::SECTION_NAME)
    }

    fn get_tcp_config(&self) -> Result<&Yaml, Fail> {
        Self::get_optional_subsection(&self.0, tcp_config::SECTION_NAME)
    }

    /// Slirp config: reads the alias network, alias host, loopback and DNS addresses.
    pub fn alias_config(&self) -> Result<AliasConfig, Fail> {
        let section: &Yaml = self.get_slirp_config()?;
        let alias_network: Option<Ipv4Addr> = Self::get_addr_option(section, slirp_config::ALIAS_NETWORK)?;
        let alias_addr: Option<Ipv4Addr> = Self::get_addr_option(section, slirp_config::ALIAS_ADDR)?;
        let loopback_addr: Option<Ipv4Addr> = Self::get_addr_option(section, slirp_config::LOOPBACK_ADDR)?;
        let dns_addrs: Option<Vec<Ipv4Addr>> = self.dns_addrs()?;

        if let Some(addr) = alias_addr {
            if addr.is_unspecified() || addr.is_broadcast() {
                let cause: String = format!("invalid alias address {}", addr);
                error!("alias_config(): {}", cause);
                return Err(Fail::new(libc::EINVAL, &cause));
            }
        }

        Ok(AliasConfig::new(alias_network, alias_addr, loopback_addr, dns_addrs))
    }

    /// Slirp config: reads the DNS server list. This cannot be passed in as an environment variable.
    fn dns_addrs(&self) -> Result<Option<Vec<Ipv4Addr>>, Fail> {
        let section: &Yaml = self.get_slirp_config()?;
        if !Self::has_option(section, slirp_config::DNS_ADDRS) {
            return Ok(None);
        }
        let entries: &Vec<Yaml> = Self::get_typed_option(section, slirp_config::DNS_ADDRS, &Yaml::as_vec)?;
        let mut result: Vec<Ipv4Addr> = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.as_str().and_then(|s| s.parse().ok()) {
                Some(addr) => result.push(addr),
                None => {
                    let cause: String = format!("cannot parse DNS server address {:?}", entry);
                    error!("dns_addrs(): {}", cause);
                    return Err(Fail::new(libc::EINVAL, &cause));
                },
            }
        }
        Ok(Some(result))
    }

    /// Tcp config: reads the engine tunables. Environment variables override the configuration file.
    pub fn tcp_config(&self) -> Result<TcpConfig, Fail> {
        let section: &Yaml = self.get_tcp_config()?;
        let mss: Option<usize> = Self::get_optional_int_option(section, tcp_config::MSS)?;
        let mtu: Option<usize> = Self::get_optional_int_option(section, tcp_config::MTU)?;
        let window_scale: Option<u8> = Self::get_optional_int_option(section, tcp_config::WINDOW_SCALE)?;
        let receive_buffer_size: Option<usize> =
            Self::get_optional_int_option(section, tcp_config::RECEIVE_BUFFER_SIZE)?;
        let send_buffer_size: Option<usize> = Self::get_optional_int_option(section, tcp_config::SEND_BUFFER_SIZE)?;
        let max_connections: Option<usize> = Self::get_optional_int_option(section, tcp_config::MAX_CONNECTIONS)?;

        Self::check_range(tcp_config::MSS, mss, |v| (MIN_MSS..=MAX_MSS).contains(&v))?;
        Self::check_range(tcp_config::MTU, mtu, |v| v >= TCPIP_HEADER_SIZE + MIN_MSS)?;
        Self::check_range(tcp_config::WINDOW_SCALE, window_scale, |v| v <= MAX_WINDOW_SCALE)?;
        Self::check_range(tcp_config::RECEIVE_BUFFER_SIZE, receive_buffer_size, |v| v > 0)?;
        Self::check_range(tcp_config::SEND_BUFFER_SIZE, send_buffer_size, |v| v > 0)?;
        Self::check_range(tcp_config::MAX_CONNECTIONS, max_connections, |v| v > 0)?;

        Ok(TcpConfig::new(
            mss,
            mtu,
            window_scale,
            receive_buffer_size,
            send_buffer_size,
            Self::get_optional_bool_option(section, tcp_config::KEEPALIVE)?,
            max_connections,
        ))
    }

    /// Emulation config: reads the user classification rules, in the order they should be added.
    pub fn emulation_entries(&self) -> Result<Vec<TosEntry>, Fail> {
        match self.0.index(emulation_config::SECTION_NAME) {
            Yaml::BadValue | Yaml::Null => Ok(Vec::new()),
            Yaml::Array(entries) => entries
                .iter()
                .map(|entry| match entry.as_str() {
                    Some(s) => s.parse::<TosEntry>(),
                    None => {
                        let cause: String = format!("emulation entry {:?} is not a string", entry);
                        error!("emulation_entries(): {}", cause);
                        Err(Fail::new(libc::EINVAL, &cause))
                    },
                })
                .collect(),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", emulation_config::SECTION_NAME);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    //======================================================================================================================
    // Static Functions
    //======================================================================================================================

    /// Like `get_subsection`, but a missing section reads as empty.
    fn get_optional_subsection<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        let section: &'a Yaml = yaml.index(index);
        match section {
            Yaml::BadValue | Yaml::Null | Yaml::Hash(_) => Ok(section),
            _ => {
                let message: String = format!("parameter \"{}\" has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    fn has_option(yaml: &Yaml, index: &str) -> bool {
        !matches!(yaml.index(index), Yaml::BadValue | Yaml::Null)
    }

    /// Index `yaml` to find the value at `index`, validating that the index exists.
    fn get_option<'a>(yaml: &'a Yaml, index: &str) -> Result<&'a Yaml, Fail> {
        match yaml.index(index) {
            Yaml::BadValue => {
                let message: String = format!("missing configuration option \"{}\"", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
            value => Ok(value),
        }
    }

    /// Index `yaml` to find the value at `index`, validating that it exists and that the receiver returns Some(_).
    fn get_typed_option<'a, T, Fn>(yaml: &'a Yaml, index: &str, receiver: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&'a Yaml) -> Option<T>,
    {
        let option: &'a Yaml = Self::get_option(yaml, index)?;
        match receiver(option) {
            Some(value) => Ok(value),
            None => {
                let message: String = format!("parameter {} has unexpected type", index);
                Err(Fail::new(libc::EINVAL, message.as_str()))
            },
        }
    }

    /// Index `yaml` to find value at `index`, validating it as a string.
    fn get_typed_str_option<T, Fn>(yaml: &Yaml, index: &str, parser: Fn) -> Result<T, Fail>
    where
        Fn: FnOnce(&str) -> Option<T>,
    {
        let option: &Yaml = Self::get_option(yaml, index)?;
        if let Some(value) = option.as_str() {
            if let Some(value) = parser(value) {
                return Ok(value);
            }
        }
        let message: String = format!("parameter {} has unexpected type", index);
        Err(Fail::new(libc::EINVAL, message.as_str()))
    }

    /// Get value where the environment value overrides the config file if it exists.
    fn get_typed_env_option<T: FromStr>(index: &str) -> Result<Option<T>, Fail> {
        if let Ok(var) = ::std::env::var(index.to_uppercase()) {
            if let Ok(value) = var.as_str().parse() {
                return Ok(Some(value));
            } else {
                let message: String = format!("parameter {} has unexpected type", index);
                return Err(Fail::new(libc::EINVAL, message.as_str()));
            }
        }
        Ok(None)
    }

    /// Similar to `get_typed_option` using `Yaml::as_i64` as the receiver, but additionally verifies that the
    /// destination type may hold the i64 value.
    fn get_int_option<T: TryFrom<i64>>(yaml: &Yaml, index: &str) -> Result<T, Fail> {
        let val: i64 = Self::get_typed_option(yaml, index, &Yaml::as_i64)?;
        match T::try_from(val) {
            Ok(val) => Ok(val),
            _ => {
                let message: String = format!("parameter \"{}\" is out of range", index);
                Err(Fail::new(libc::ERANGE, message.as_str()))
            },
        }
    }

    /// Same as `Self::get_typed_option` using `Yaml::as_bool` as the receiver.
    fn get_bool_option(yaml: &Yaml, index: &str) -> Result<bool, Fail> {
        Self::get_typed_option(yaml, index, &Yaml::as_bool)
    }

    /// Environment first, then the file; `None` if neither sets it.
    fn get_optional_int_option<T: TryFrom<i64> + FromStr>(yaml: &Yaml, index: &str) -> Result<Option<T>, Fail> {
        if let Some(value) = Self::get_typed_env_option(index)? {
            return Ok(Some(value));
        }
        if !Self::has_option(yaml, index) {
            return Ok(None);
        }
        Self::get_int_option(yaml, index).map(Some)
    }

    fn get_optional_bool_option(yaml: &Yaml, index: &str) -> Result<Option<bool>, Fail> {
        if let Some(value) = Self::get_typed_env_option(index)? {
            return Ok(Some(value));
        }
        if !Self::has_option(yaml, index) {
            return Ok(None);
        }
        Self::get_bool_option(yaml, index).map(Some)
    }

    /// Fails with `ERANGE` if `value` is set and `valid` rejects it.
    fn check_range<T: Copy>(index: &str, value: Option<T>, valid: impl Fn(T) -> bool) -> Result<(), Fail> {
        match value {
            Some(v) if !valid(v) => {
                let cause: String = format!("parameter \"{}\" is out of range", index);
                error!("check_range(): {}", cause);
                Err(Fail::new(libc::ERANGE, &cause))
            },
            _ => Ok(()),
        }
    }

    fn get_addr_option(yaml: &Yaml, index: &str) -> Result<Option<Ipv4Addr>, Fail> {
        if let Some(addr) = Self::get_typed_env_option(index)? {
            return Ok(Some(addr));
        }
        if !Self::has_option(yaml, index) {
            return Ok(None);
        }
        Self::get_typed_str_option(yaml, index, |val: &str| val.parse().ok()).map(Some)
    }
}

//======================================================================================================================
// Trait Implementations
//======================================================================================================================

/// Parses a configuration held in memory. An empty document is an empty configuration.
impl FromStr for Config {
    type Err = Fail;

    fn from_str(s: &str) -> Result<Self, Fail> {
        let config: Vec<Yaml> = YamlLoader::load_from_str(s).map_err(|e| {
            let cause: String = format!("malformed configuration: {}", e);
            error!("from_str(): {}", cause);
            Fail::new(libc::EINVAL, &cause)
        })?;
        match &config[..] {
            [] => Ok(Self(Yaml::Null)),
            [c] => Ok(Self(c.clone())),
            _ => Err(Fail::new(libc::EINVAL, "Wrong number of config objects")),
        }
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::handlers;
use crate::{v4, v6};

/// Top-level configuration: a set of named servers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub servers: HashMap<String, ServerConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Network interfaces to bind listeners to. Empty means all interfaces.
    #[serde(default)]
    pub interfaces: Vec<String>,

    /// Socket addresses to bind listeners to, either bare IPs (the port is
    /// chosen by address family) or `ip:port`. Listener addresses must be
    /// unique across all configured servers. Empty means the defaults,
    /// `0.0.0.0:67` and `[::]:547`.
    #[serde(default)]
    pub addresses: Vec<String>,

    /// Enables access logging.
    #[serde(default)]
    pub logs: bool,

    /// The handler chain. Requests flow from the first handler to the last;
    /// responses flow back up the list. Not every handler calls the next one.
    #[serde(default)]
    pub handle: Vec<HandlerConfig>,
}

/// One configured handler. The tag names the handler module; the remaining
/// fields are handler-specific. This enum is the handler registry: adding a
/// handler means adding a variant here and a match arm in provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "handler", rename_all = "lowercase")]
pub enum HandlerConfig {
    File(handlers::file::FileConfig),
    Range(handlers::range::RangeConfig),
    Prefix(handlers::prefix::PrefixConfig),
    Serverid(handlers::serverid::ServerIdConfig),
    Autoconfigure(handlers::autoconfigure::AutoConfigureConfig),
    Ipv6only(handlers::ipv6only::Ipv6OnlyConfig),
    Nbp(handlers::nbp::NbpConfig),
    Leasetime(handlers::leasetime::LeaseTimeConfig),
    Mtu(handlers::mtu::MtuConfig),
    Netmask(handlers::netmask::NetmaskConfig),
    Router(handlers::router::RouterConfig),
    Dns(handlers::dns::DnsConfig),
    Searchdomains(handlers::searchdomains::SearchDomainsConfig),
    Staticroute(handlers::staticroute::StaticRouteConfig),
    Sleep(handlers::sleep::SleepConfig),
    Example(handlers::example::ExampleConfig),
    Messagelog(handlers::messagelog::MessageLogConfig),
}

impl Config {
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen_addresses: HashSet<SocketAddr> = HashSet::new();
        for (name, server) in &self.servers {
            for addr in server.resolved_addresses()? {
                if !seen_addresses.insert(addr) {
                    return Err(Error::InvalidConfig(format!(
                        "listener address {} of server {} is already in use by another server",
                        addr, name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl ServerConfig {
    /// The interfaces to bind on; an empty string means all interfaces.
    pub fn resolved_interfaces(&self) -> Vec<String> {
        if self.interfaces.is_empty() {
            vec![String::new()]
        } else {
            self.interfaces.clone()
        }
    }

    pub fn resolved_addresses(&self) -> Result<Vec<SocketAddr>> {
        if self.addresses.is_empty() {
            return Ok(vec![
                SocketAddr::new(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED), v4::DHCP_SERVER_PORT),
                SocketAddr::new(IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED), v6::DHCP_SERVER_PORT),
            ]);
        }
        self.addresses.iter().map(|addr| parse_bind_address(addr)).collect()
    }
}

/// Parses a listener address. Bare IPs get the DHCP server port of their
/// family; a bare port is rejected because the family cannot be determined.
pub fn parse_bind_address(address: &str) -> Result<SocketAddr> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        let port = match ip {
            IpAddr::V4(_) => v4::DHCP_SERVER_PORT,
            IpAddr::V6(_) => v6::DHCP_SERVER_PORT,
        };
        return Ok(SocketAddr::new(ip, port));
    }
    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Ok(addr);
    }
    if address.parse::<u16>().is_ok() {
        return Err(Error::InvalidConfig(format!(
            "only a port specified, please also specify an IP address: {}",
            address
        )));
    }
    Err(Error::InvalidConfig(format!(
        "invalid listener address: {}",
        address
    )))
}

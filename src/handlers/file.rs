//! Static mapping of client identifiers to IP addresses, read from a text
//! file. Each non-empty, non-`#` line has two whitespace-separated fields:
//! an identifier (MAC address for DHCPv4, any key for DHCPv6) and an IP
//! address. For example:
//!
//! ```text
//! 00:11:22:33:44:55 10.0.0.1
//! 01:23:45:67:89:ab 10.0.10.10
//! 02:34:56:78:9a:bc 2001:db8::1
//! ```
//!
//! With `autoRefresh` enabled the mapping is reloaded whenever the file is
//! written; lookups keep serving the old snapshot until the swap.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{hex_encode, Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::Dhcpv4Packet;
use crate::v6::{self, Dhcpv6Message, IaAddress, IaNa};

const STATIC_LEASE_LIFETIME_SECS: u32 = 3600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub filename: String,

    #[serde(default, rename = "autoRefresh")]
    pub auto_refresh: bool,
}

#[derive(Debug, Default)]
struct Records {
    v4: HashMap<String, Ipv4Addr>,
    v6: HashMap<String, Ipv6Addr>,
}

pub struct FileHandler {
    records: Arc<RwLock<Records>>,
}

impl FileHandler {
    pub async fn provision(config: &FileConfig) -> Result<Arc<Self>> {
        let records = Arc::new(RwLock::new(load_records(&config.filename).await?));
        let handler = Arc::new(Self {
            records: Arc::clone(&records),
        });
        if config.auto_refresh {
            watch_records(config.filename.clone(), records)?;
        }
        Ok(handler)
    }

    async fn lookup4(&self, mac: &str) -> Option<Ipv4Addr> {
        self.records.read().await.v4.get(mac).copied()
    }

    async fn lookup6(&self, duid: &str) -> Option<Ipv6Addr> {
        self.records.read().await.v6.get(duid).copied()
    }
}

#[async_trait]
impl Handler for FileHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        let mac = req.mac_address();
        debug!(mac = %mac, "looking up an IP address for MAC");
        match self.lookup4(&mac).await {
            Some(ip) => {
                resp.yiaddr = ip;
                info!(mac = %mac, ip = %ip, "found IP address for MAC");
            }
            None => {
                warn!(mac = %mac, "MAC address is unknown");
            }
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        let Some(iana) = req.one_iana() else {
            debug!("no address requested");
            return next.call(req, resp).await;
        };
        let Some(client_id) = req.client_id() else {
            debug!("no client identifier in request");
            return next.call(req, resp).await;
        };

        let duid = hex_encode(client_id);
        info!(duid = %duid, "looking up an IP address for DUID");
        match self.lookup6(&duid).await {
            Some(ip) => {
                resp.add_option(v6::DhcpOption::IaNa(IaNa {
                    iaid: iana.iaid,
                    t1: 0,
                    t2: 0,
                    options: vec![v6::DhcpOption::IaAddress(IaAddress {
                        addr: ip,
                        preferred: STATIC_LEASE_LIFETIME_SECS,
                        valid: STATIC_LEASE_LIFETIME_SECS,
                        options: vec![],
                    })],
                }));
                info!(duid = %duid, ip = %ip, "found IP address for DUID");
            }
            None => {
                warn!(duid = %duid, "DUID is unknown");
            }
        }
        next.call(req, resp).await
    }
}

async fn load_records(filename: &str) -> Result<Records> {
    debug!(filename, "reading leases");
    let data = tokio::fs::read_to_string(filename).await?;
    let mut records = Records::default();
    for line in data.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() != 2 {
            return Err(Error::InvalidConfig(format!(
                "malformed lease line, want 2 fields, got {}: {}",
                tokens.len(),
                line
            )));
        }
        let id = tokens[0].to_lowercase();
        let ip: IpAddr = tokens[1].parse().map_err(|_| {
            Error::InvalidConfig(format!("malformed lease line, bad IP address: {}", line))
        })?;
        match ip {
            IpAddr::V4(v4) => {
                records.v4.insert(id.clone(), v4);
                records.v6.insert(id, v4.to_ipv6_mapped());
            }
            IpAddr::V6(v6) => {
                records.v6.insert(id, v6);
            }
        }
    }
    info!(
        filename,
        "loaded {} DHCPv4 leases and {} DHCPv6 leases",
        records.v4.len(),
        records.v6.len()
    );
    Ok(records)
}

/// Watches the lease file and swaps in a fresh mapping on every write event.
/// Reload failures keep the previous snapshot and never tear down the server.
fn watch_records(filename: String, records: Arc<RwLock<Records>>) -> Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<notify::Result<Event>>(16);
    let mut watcher = notify::recommended_watcher(move |event| {
        let _ = tx.blocking_send(event);
    })
    .map_err(|error| Error::Handler(format!("failed to create watcher: {}", error)))?;
    watcher
        .watch(Path::new(&filename), RecursiveMode::NonRecursive)
        .map_err(|error| Error::Handler(format!("failed to watch {}: {}", filename, error)))?;

    tokio::spawn(async move {
        // The watcher lives as long as this task.
        let _watcher = watcher;
        while let Some(event) = rx.recv().await {
            match event {
                Ok(event) if matches!(event.kind, EventKind::Modify(_)) => {
                    info!(filename = %filename, "file changed");
                    match load_records(&filename).await {
                        Ok(fresh) => *records.write().await = fresh,
                        Err(error) => error!(error = %error, "failed to refresh records"),
                    }
                }
                Ok(_) => {}
                Err(error) => warn!(error = %error, "file watcher error"),
            }
        }
    });
    Ok(())
}

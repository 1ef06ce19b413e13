//! Dynamic DHCPv4 leases out of an address range.
//!
//! Leases are kept in memory for lookups and persisted to a local SQLite
//! file so restarts do not hand out addresses that are already taken: at
//! provision time every stored lease is re-allocated in the bitmap before
//! the first request is served.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use ipnet::{IpNet, Ipv4Net};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Handler, Next4, Next6};
use crate::allocator::{Allocator, Ipv4RangeAllocator};
use crate::error::{Error, Result};
use crate::v4::Dhcpv4Packet;
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    /// Path of the SQLite lease database. Created if missing.
    pub filename: String,

    #[serde(rename = "startIP")]
    pub start_ip: Ipv4Addr,

    #[serde(rename = "endIP")]
    pub end_ip: Ipv4Addr,

    #[serde(
        rename = "leaseTime",
        default = "default_lease_time",
        with = "humantime_serde"
    )]
    pub lease_time: Duration,
}

fn default_lease_time() -> Duration {
    Duration::from_secs(3600)
}

/// One IPv4 lease as stored: address, expiry as unix seconds, hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub ip: Ipv4Addr,
    pub expires_unix: i64,
    pub hostname: String,
}

/// The `leases4` table, `insert or replace` on write.
pub struct LeaseStore {
    pool: SqlitePool,
}

impl LeaseStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|error| Error::Store(format!("failed to open lease database: {}", error)))?;
        sqlx::query(
            "create table if not exists leases4 (\
             mac text not null, ip text not null, expiry int, hostname text not null, \
             primary key (mac, ip))",
        )
        .execute(&pool)
        .await
        .map_err(|error| Error::Store(format!("table creation failed: {}", error)))?;
        Ok(Self { pool })
    }

    pub async fn load_all(&self) -> Result<HashMap<String, LeaseRecord>> {
        let rows = sqlx::query("select mac, ip, expiry, hostname from leases4")
            .fetch_all(&self.pool)
            .await
            .map_err(|error| Error::Store(format!("failed to query leases: {}", error)))?;

        let mut records = HashMap::new();
        for row in rows {
            let mac: String = row
                .try_get("mac")
                .map_err(|error| Error::Store(error.to_string()))?;
            let ip: String = row
                .try_get("ip")
                .map_err(|error| Error::Store(error.to_string()))?;
            let expires_unix: i64 = row
                .try_get("expiry")
                .map_err(|error| Error::Store(error.to_string()))?;
            let hostname: String = row
                .try_get("hostname")
                .map_err(|error| Error::Store(error.to_string()))?;
            let ip: Ipv4Addr = ip
                .parse()
                .map_err(|_| Error::Store(format!("expected an IPv4 address, got: {}", ip)))?;
            records.insert(
                mac.to_lowercase(),
                LeaseRecord {
                    ip,
                    expires_unix,
                    hostname,
                },
            );
        }
        Ok(records)
    }

    pub async fn save(&self, mac: &str, record: &LeaseRecord) -> Result<()> {
        sqlx::query("insert or replace into leases4(mac, ip, expiry, hostname) values (?, ?, ?, ?)")
            .bind(mac)
            .bind(record.ip.to_string())
            .bind(record.expires_unix)
            .bind(record.hostname.as_str())
            .execute(&self.pool)
            .await
            .map_err(|error| Error::Store(format!("record insert/update failed: {}", error)))?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub struct RangeHandler {
    allocator: Ipv4RangeAllocator,
    store: LeaseStore,
    records: RwLock<HashMap<String, LeaseRecord>>,
    lease_secs: i64,
}

impl RangeHandler {
    pub async fn provision(config: &RangeConfig) -> Result<Arc<Self>> {
        let allocator = Ipv4RangeAllocator::new(config.start_ip, config.end_ip)?;
        let store = LeaseStore::open(&config.filename).await?;
        let records = store.load_all().await?;

        // Reserve every persisted lease before the first request is served;
        // the allocator handing back anything else means the database and
        // the range no longer agree.
        for record in records.values() {
            let hint = IpNet::V4(Ipv4Net::from(record.ip));
            let allocated = allocator.allocate(Some(hint)).map_err(|error| {
                Error::Store(format!(
                    "failed to re-allocate leased ip {}: {}",
                    record.ip, error
                ))
            })?;
            if allocated != hint {
                return Err(Error::Store(format!(
                    "allocator did not re-allocate requested leased ip {}: {}",
                    record.ip, allocated
                )));
            }
        }

        Ok(Arc::new(Self {
            allocator,
            store,
            records: RwLock::new(records),
            lease_secs: config.lease_time.as_secs() as i64,
        }))
    }

    async fn lookup4(&self, mac: String, hostname: String) -> Result<Ipv4Addr> {
        let mut records = self.records.write().await;
        let new_expiry = Utc::now().timestamp() + self.lease_secs;

        if let Some(record) = records.get_mut(&mac) {
            // Extend the existing lease at least past the expiry we are
            // about to hand out.
            if record.expires_unix < new_expiry {
                record.expires_unix = new_expiry;
                record.hostname = hostname;
                self.store.save(&mac, record).await?;
            }
            return Ok(record.ip);
        }

        info!(mac = %mac, "leasing new IPv4 address");
        let allocated = self.allocator.allocate(None)?;
        let IpNet::V4(net) = allocated else {
            return Err(Error::Handler(
                "range allocator returned a non-IPv4 block".to_string(),
            ));
        };
        let record = LeaseRecord {
            ip: net.addr(),
            expires_unix: new_expiry,
            hostname,
        };
        if let Err(error) = self.store.save(&mac, &record).await {
            // Return the slot so a transient store failure does not leak it.
            self.allocator.free(allocated)?;
            return Err(error);
        }
        let ip = record.ip;
        records.insert(mac, record);
        Ok(ip)
    }

    #[cfg(test)]
    pub(crate) fn allocator(&self) -> &Ipv4RangeAllocator {
        &self.allocator
    }
}

#[async_trait]
impl Handler for RangeHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        let mac = req.mac_address();
        debug!(mac = %mac, "looking up an IP address for MAC");
        let hostname = req.hostname().unwrap_or_default().to_string();
        let ip = self.lookup4(mac.clone(), hostname).await?;
        resp.yiaddr = ip;
        info!(mac = %mac, ip = %ip, "found IP address for MAC");
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // The range pool is IPv4-only, so just continue the chain.
        next.call(req, resp).await
    }
}

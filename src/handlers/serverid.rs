//! Server identification.
//!
//! DHCPv4: injects the server-identifier option and drops requests addressed
//! to a different server. DHCPv6: enforces the RFC 8415 §16 rules on the
//! ServerID option (Solicit/Confirm/Rebind must not carry one,
//! Request/Renew/Decline/Release must carry ours) and stamps our DUID on
//! every reply.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::{self, Dhcpv4Packet};
use crate::v6::{self, Dhcpv6Message, Duid, MessageType};

/// Seconds between the unix epoch and 2000-01-01, the DUID-LLT epoch.
const DUID_EPOCH_OFFSET: i64 = 946_684_800;

const HW_TYPE_ETHERNET: u16 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerIdConfig {
    /// DHCPv4 server identifier.
    #[serde(default)]
    pub id: Option<Ipv4Addr>,

    /// DHCPv6 server DUID as `"<type> <value>"`, where type is `ll`, `llt`
    /// or `uuid`.
    #[serde(default)]
    pub duid: Option<String>,
}

pub struct ServerIdHandler {
    id: Option<Ipv4Addr>,
    duid: Option<Vec<u8>>,
}

impl ServerIdHandler {
    pub fn provision(config: &ServerIdConfig) -> Result<Arc<Self>> {
        let duid = config
            .duid
            .as_deref()
            .map(parse_duid)
            .transpose()?
            .map(|duid| duid.to_bytes());
        Ok(Arc::new(Self {
            id: config.id,
            duid,
        }))
    }
}

fn parse_duid(text: &str) -> Result<Duid> {
    let Some((duid_type, value)) = text.split_once(' ') else {
        return Err(Error::InvalidConfig(
            "need a DUID type and value".to_string(),
        ));
    };
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidConfig("got empty DUID value".to_string()));
    }
    match duid_type.to_lowercase().as_str() {
        "ll" | "duid-ll" | "duid_ll" => Ok(Duid::LinkLayer {
            hw_type: HW_TYPE_ETHERNET,
            addr: parse_mac(value)?,
        }),
        "llt" | "duid-llt" | "duid_llt" => Ok(Duid::LinkLayerTime {
            hw_type: HW_TYPE_ETHERNET,
            time: duid_time(),
            addr: parse_mac(value)?,
        }),
        "uuid" => {
            let id = uuid::Uuid::parse_str(value)
                .map_err(|error| Error::InvalidConfig(format!("invalid DUID UUID: {}", error)))?;
            Ok(Duid::Uuid(id))
        }
        other => Err(Error::InvalidConfig(format!(
            "DUID type {} not supported",
            other
        ))),
    }
}

fn parse_mac(text: &str) -> Result<Vec<u8>> {
    let bytes: Vec<u8> = text
        .split([':', '-'])
        .map(|part| u8::from_str_radix(part, 16))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| Error::InvalidConfig(format!("invalid MAC address: {}", text)))?;
    if bytes.len() != 6 {
        return Err(Error::InvalidConfig(format!(
            "invalid MAC address: {}",
            text
        )));
    }
    Ok(bytes)
}

/// Seconds since 2000-01-01 modulo 2^32 (RFC 8415 §11.2).
fn duid_time() -> u32 {
    (chrono::Utc::now().timestamp() - DUID_EPOCH_OFFSET) as u32
}

#[async_trait]
impl Handler for ServerIdHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        let Some(id) = self.id else {
            return next.call(req, resp).await;
        };
        if req.op != v4::BOOTREQUEST {
            warn!("not a BootRequest, ignoring");
            return next.call(req, resp).await;
        }
        if let Some(sid) = req.server_identifier() {
            if sid != id {
                info!(got = %sid, want = %id, "requested server ID does not match this server's ID");
                return Err(Error::Drop);
            }
        }
        if !req.siaddr.is_unspecified() && req.siaddr != id {
            info!(got = %req.siaddr, want = %id, "requested server ID does not match this server's ID");
            return Err(Error::Drop);
        }
        resp.update_option(v4::DhcpOption::ServerIdentifier(id));
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        let Some(duid) = &self.duid else {
            return next.call(req, resp).await;
        };

        if let Some(sid) = req.server_id() {
            // RFC 8415 §16.{2,5,7}: these types must be discarded when they
            // carry any ServerID option.
            if matches!(
                req.msg_type,
                MessageType::Solicit | MessageType::Confirm | MessageType::Rebind
            ) {
                return Err(Error::Drop);
            }
            // Approximately all others must be discarded on a mismatch.
            if sid != duid.as_slice() {
                info!("requested server DUID does not match this server's DUID");
                return Err(Error::Drop);
            }
        } else if matches!(
            req.msg_type,
            MessageType::Request | MessageType::Renew | MessageType::Decline | MessageType::Release
        ) {
            // RFC 8415 §16.{6,8,10,11}: these types must be discarded when
            // they carry no ServerID option.
            return Err(Error::Drop);
        }
        resp.update_option(v6::DhcpOption::ServerId(duid.clone()));
        next.call(req, resp).await
    }
}

//! RFC 8925 IPv6-Only Preferred (DHCPv4 only): clients that ask for the
//! option are told to stay off IPv4 for the configured wait. Unlike most
//! option handlers this one never short-circuits, so IP allocation further
//! down the chain still happens for dual-stack clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::{self, Dhcpv4Packet, OptionCode};
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ipv6OnlyConfig {
    /// The V6ONLY_WAIT value (RFC 8925 §3.2).
    #[serde(with = "humantime_serde")]
    pub wait: Duration,
}

pub struct Ipv6OnlyHandler {
    wait_secs: u32,
}

impl Ipv6OnlyHandler {
    pub fn provision(config: &Ipv6OnlyConfig) -> Arc<Self> {
        Arc::new(Self {
            wait_secs: config.wait.as_secs() as u32,
        })
    }
}

#[async_trait]
impl Handler for Ipv6OnlyHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if req.is_option_requested(OptionCode::Ipv6OnlyPreferred) {
            resp.update_option(v4::DhcpOption::Ipv6OnlyPreferred(self.wait_secs));
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // IPv6-only-preferred does not apply to DHCPv6, so just continue.
        next.call(req, resp).await
    }
}

//! Sets the router option on every DHCPv4 reply.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::{self, Dhcpv4Packet};
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub routers: Vec<Ipv4Addr>,
}

pub struct RouterHandler {
    routers: Vec<Ipv4Addr>,
}

impl RouterHandler {
    pub fn provision(config: &RouterConfig) -> Result<Arc<Self>> {
        if config.routers.is_empty() {
            return Err(Error::InvalidConfig(
                "need at least one router address".to_string(),
            ));
        }
        Ok(Arc::new(Self {
            routers: config.routers.clone(),
        }))
    }
}

#[async_trait]
impl Handler for RouterHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        resp.update_option(v4::DhcpOption::Router(self.routers.clone()));
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // Router does not apply to DHCPv6, so just continue.
        next.call(req, resp).await
    }
}

//! Sets the interface MTU option when the client asks for it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::{self, Dhcpv4Packet, OptionCode};
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtuConfig {
    pub mtu: u16,
}

pub struct MtuHandler {
    mtu: u16,
}

impl MtuHandler {
    pub fn provision(config: &MtuConfig) -> Arc<Self> {
        Arc::new(Self { mtu: config.mtu })
    }
}

#[async_trait]
impl Handler for MtuHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if req.is_option_requested(OptionCode::InterfaceMtu) {
            resp.update_option(v4::DhcpOption::InterfaceMtu(self.mtu));
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // DHCPv6 has no MTU option, so just continue.
        next.call(req, resp).await
    }
}

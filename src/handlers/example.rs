//! A handler to start your own from: it logs every packet with a
//! configurable prefix and continues the chain. The input arguments are the
//! request the server received and the response computed so far; `next` will
//! run the rest of the chain and is never a no-op to call.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::Dhcpv4Packet;
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExampleConfig {
    #[serde(default)]
    pub prefix: String,
}

pub struct ExampleHandler {
    prefix: String,
}

impl ExampleHandler {
    pub fn provision(config: &ExampleConfig) -> Arc<Self> {
        Arc::new(Self {
            prefix: config.prefix.clone(),
        })
    }
}

#[async_trait]
impl Handler for ExampleHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        info!(summary = %req.summary(), "{}: received DHCPv4 packet", self.prefix);
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        info!(summary = %req.summary(), "{}: received DHCPv6 packet", self.prefix);
        next.call(req, resp).await
    }
}

//! Logs a debug summary of every request flowing through the chain.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::Dhcpv4Packet;
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageLogConfig {}

pub struct MessageLogHandler;

impl MessageLogHandler {
    pub fn provision(_config: &MessageLogConfig) -> Arc<Self> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Handler for MessageLogHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        debug!(message = %req.summary(), "received message");
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        debug!(message = %req.summary(), "received message");
        next.call(req, resp).await
    }
}

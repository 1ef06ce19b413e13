//! Delays the response by a fixed duration. Useful for exercising timing
//! and ordering in tests; keep it out of production chains.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::Dhcpv4Packet;
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SleepConfig {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
}

pub struct SleepHandler {
    duration: Duration,
}

impl SleepHandler {
    pub fn provision(config: &SleepConfig) -> Arc<Self> {
        Arc::new(Self {
            duration: config.duration,
        })
    }
}

#[async_trait]
impl Handler for SleepHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        info!(delay = ?self.duration, "introducing delay in response");
        tokio::time::sleep(self.duration).await;
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        info!(delay = ?self.duration, "introducing delay in response");
        tokio::time::sleep(self.duration).await;
        next.call(req, resp).await
    }
}

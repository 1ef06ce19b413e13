//! RFC 2563 auto-configuration (DHCPv4 only):
//!
//! 1. If the client has been allocated an IP address, do nothing.
//! 2. If not (the offer's yiaddr is 0.0.0.0):
//!    2a. a client that sent the AutoConfigure option gets the configured
//!        value back;
//!    2b. any other client gets no reply at all.
//!
//! This handler belongs at the end of the chain, after any address
//! allocation has taken place.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::{self, Dhcpv4Packet, MessageType};
use crate::v6::Dhcpv6Message;

const DO_NOT_AUTO_CONFIGURE: u8 = 0;
const AUTO_CONFIGURE: u8 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AutoConfigureConfig {
    #[serde(default)]
    pub autoconfigure: bool,
}

pub struct AutoConfigureHandler {
    value: u8,
}

impl AutoConfigureHandler {
    pub fn provision(config: &AutoConfigureConfig) -> Arc<Self> {
        Arc::new(Self {
            value: if config.autoconfigure {
                AUTO_CONFIGURE
            } else {
                DO_NOT_AUTO_CONFIGURE
            },
        })
    }
}

#[async_trait]
impl Handler for AutoConfigureHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if resp.message_type() != Some(MessageType::Offer) || !resp.yiaddr.is_unspecified() {
            return next.call(req, resp).await;
        }

        if req.auto_configure().is_some() {
            resp.update_option(v4::DhcpOption::AutoConfigure(self.value));
            debug!(mac = %req.mac_address(), "responded with autoconfigure");
            return next.call(req, resp).await;
        }

        debug!(mac = %req.mac_address(), "client does not support autoconfigure");
        // RFC 2563 §2.3: a DISCOVER without the Auto-Configure option is not
        // answered when no address was chosen.
        Err(Error::Drop)
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // Autoconfigure does not apply to DHCPv6, so just continue.
        next.call(req, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerChain;
    use std::net::Ipv4Addr;

    fn discover(with_autoconfigure: bool) -> Dhcpv4Packet {
        let mut packet = Dhcpv4Packet {
            op: v4::BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 1,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: [0; 16],
            sname: [0; 64],
            file: [0; 128],
            options: Vec::new(),
        };
        packet.update_option(v4::DhcpOption::MessageType(MessageType::Discover));
        if with_autoconfigure {
            packet.update_option(v4::DhcpOption::AutoConfigure(1));
        }
        packet
    }

    fn chain() -> HandlerChain {
        HandlerChain::new(vec![AutoConfigureHandler::provision(
            &AutoConfigureConfig::default(),
        ) as Arc<dyn Handler>])
    }

    #[tokio::test]
    async fn test_unanswered_without_autoconfigure_option() {
        let req = discover(false);
        let mut resp = Dhcpv4Packet::create_reply(&req);
        resp.update_option(v4::DhcpOption::MessageType(MessageType::Offer));
        assert!(matches!(
            chain().handle4(&req, &mut resp).await,
            Err(Error::Drop)
        ));
    }

    #[tokio::test]
    async fn test_answered_with_autoconfigure_option() {
        let req = discover(true);
        let mut resp = Dhcpv4Packet::create_reply(&req);
        resp.update_option(v4::DhcpOption::MessageType(MessageType::Offer));
        chain().handle4(&req, &mut resp).await.unwrap();
        assert_eq!(resp.auto_configure(), Some(0));
    }

    #[tokio::test]
    async fn test_allocated_offer_passes_through() {
        let req = discover(false);
        let mut resp = Dhcpv4Packet::create_reply(&req);
        resp.update_option(v4::DhcpOption::MessageType(MessageType::Offer));
        resp.yiaddr = Ipv4Addr::new(10, 0, 0, 5);
        chain().handle4(&req, &mut resp).await.unwrap();
        assert_eq!(resp.auto_configure(), None);
    }
}

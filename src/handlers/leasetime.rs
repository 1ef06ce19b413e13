//! Sets the IPv4 address lease time when the client asks for it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::{self, Dhcpv4Packet, OptionCode};
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseTimeConfig {
    #[serde(with = "humantime_serde")]
    pub time: Duration,
}

pub struct LeaseTimeHandler {
    secs: u32,
}

impl LeaseTimeHandler {
    pub fn provision(config: &LeaseTimeConfig) -> Arc<Self> {
        Arc::new(Self {
            secs: config.time.as_secs() as u32,
        })
    }
}

#[async_trait]
impl Handler for LeaseTimeHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if req.op == v4::BOOTREQUEST && req.is_option_requested(OptionCode::LeaseTime) {
            resp.update_option(v4::DhcpOption::LeaseTime(self.secs));
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // Lease time does not apply to DHCPv6, so just continue.
        next.call(req, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerChain;
    use crate::v4::MessageType;
    use std::net::Ipv4Addr;

    fn request(requested: bool) -> Dhcpv4Packet {
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
        packet.update_option(v4::DhcpOption::MessageType(MessageType::Request));
        if requested {
            packet.update_option(v4::DhcpOption::ParameterRequestList(vec![
                OptionCode::LeaseTime as u8,
            ]));
        }
        packet
    }

    fn chain() -> HandlerChain {
        HandlerChain::new(vec![LeaseTimeHandler::provision(&LeaseTimeConfig {
            time: Duration::from_secs(7200),
        }) as Arc<dyn Handler>])
    }

    #[tokio::test]
    async fn test_sets_lease_time_when_requested() {
        let req = request(true);
        let mut resp = Dhcpv4Packet::create_reply(&req);
        chain().handle4(&req, &mut resp).await.unwrap();
        assert_eq!(
            resp.get_option(OptionCode::LeaseTime),
            Some(&v4::DhcpOption::LeaseTime(7200))
        );
    }

    #[tokio::test]
    async fn test_silent_when_not_requested() {
        let req = request(false);
        let mut resp = Dhcpv4Packet::create_reply(&req);
        chain().handle4(&req, &mut resp).await.unwrap();
        assert!(resp.get_option(OptionCode::LeaseTime).is_none());
    }
}

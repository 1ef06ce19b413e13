//! Sets the DNS server list when the client asks for it. A single server
//! list is split by address family at provision time.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::{self, Dhcpv4Packet, OptionCode};
use crate::v6::{self, Dhcpv6Message};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub servers: Vec<IpAddr>,
}

pub struct DnsHandler {
    servers4: Vec<Ipv4Addr>,
    servers6: Vec<Ipv6Addr>,
}

impl DnsHandler {
    pub fn provision(config: &DnsConfig) -> Arc<Self> {
        let mut servers4 = Vec::new();
        let mut servers6 = Vec::new();
        for server in &config.servers {
            match server {
                IpAddr::V4(v4) => servers4.push(*v4),
                IpAddr::V6(v6) => servers6.push(*v6),
            }
        }
        Arc::new(Self { servers4, servers6 })
    }
}

#[async_trait]
impl Handler for DnsHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if req.is_option_requested(OptionCode::DnsServer) && !self.servers4.is_empty() {
            resp.update_option(v4::DhcpOption::DnsServer(self.servers4.clone()));
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        if req.is_option_requested(v6::option_code::DNS_SERVERS) && !self.servers6.is_empty() {
            resp.update_option(v6::DhcpOption::DnsServers(self.servers6.clone()));
        }
        next.call(req, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerChain;
    use crate::v6::MessageType;

    #[tokio::test]
    async fn test_v6_servers_set_when_requested() {
        let handler = DnsHandler::provision(&DnsConfig {
            servers: vec![
                "8.8.8.8".parse().unwrap(),
                "2001:4860:4860::8888".parse().unwrap(),
            ],
        });
        let chain = HandlerChain::new(vec![handler as Arc<dyn Handler>]);

        let mut req = Dhcpv6Message::new(MessageType::InformationRequest);
        req.add_option(v6::DhcpOption::Oro(vec![v6::option_code::DNS_SERVERS]));
        let mut resp = Dhcpv6Message::reply_to(MessageType::Reply, &req);
        chain.handle6(&req, &mut resp).await.unwrap();

        assert_eq!(
            resp.get_option(v6::option_code::DNS_SERVERS),
            Some(&v6::DhcpOption::DnsServers(vec![
                "2001:4860:4860::8888".parse().unwrap()
            ]))
        );
    }
}

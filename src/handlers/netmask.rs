//! Sets the subnet mask option on every DHCPv4 reply.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::{self, Dhcpv4Packet};
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetmaskConfig {
    pub netmask: Ipv4Addr,
}

pub struct NetmaskHandler {
    netmask: Ipv4Addr,
}

impl NetmaskHandler {
    pub fn provision(config: &NetmaskConfig) -> Result<Arc<Self>> {
        if !is_valid_netmask(config.netmask) {
            return Err(Error::InvalidConfig(format!(
                "netmask is not valid, got: {}",
                config.netmask
            )));
        }
        Ok(Arc::new(Self {
            netmask: config.netmask,
        }))
    }
}

fn is_valid_netmask(netmask: Ipv4Addr) -> bool {
    let bits = u32::from(netmask);
    if bits == 0 {
        return false;
    }
    let inverted = !bits;
    (inverted & inverted.wrapping_add(1)) == 0
}

#[async_trait]
impl Handler for NetmaskHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        resp.update_option(v4::DhcpOption::SubnetMask(self.netmask));
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // Netmask does not apply to DHCPv6, so just continue.
        next.call(req, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_netmask_validation() {
        assert!(is_valid_netmask(Ipv4Addr::new(255, 255, 255, 0)));
        assert!(is_valid_netmask(Ipv4Addr::new(255, 255, 240, 0)));
        assert!(is_valid_netmask(Ipv4Addr::new(255, 0, 0, 0)));
        assert!(is_valid_netmask(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(!is_valid_netmask(Ipv4Addr::new(255, 0, 255, 0)));
        assert!(!is_valid_netmask(Ipv4Addr::new(0, 0, 0, 0)));
        assert!(!is_valid_netmask(Ipv4Addr::new(255, 255, 0, 255)));
    }

    #[test]
    fn test_provision_rejects_bad_mask() {
        assert!(NetmaskHandler::provision(&NetmaskConfig {
            netmask: Ipv4Addr::new(0, 255, 0, 0),
        })
        .is_err());
    }
}

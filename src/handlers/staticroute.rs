//! Sets classless static routes (RFC 3442) when the client asks for them.
//! Each configured route is a `"destination-cidr,gateway"` pair.

use std::net::Ipv4Addr;
use std::sync::Arc;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::{self, Dhcpv4Packet, OptionCode, StaticRoute};
use crate::v6::Dhcpv6Message;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRouteConfig {
    #[serde(default)]
    pub routes: Vec<String>,
}

pub struct StaticRouteHandler {
    routes: Vec<StaticRoute>,
}

impl StaticRouteHandler {
    pub fn provision(config: &StaticRouteConfig) -> Result<Arc<Self>> {
        let mut routes = Vec::new();
        for arg in &config.routes {
            let Some((dest, router)) = arg.split_once(',') else {
                return Err(Error::InvalidConfig(format!(
                    "expected a destination/gateway pair, got: {}",
                    arg
                )));
            };
            let dest: Ipv4Net = dest.parse().map_err(|_| {
                Error::InvalidConfig(format!("expected a destination subnet, got: {}", dest))
            })?;
            let router: Ipv4Addr = router.parse().map_err(|_| {
                Error::InvalidConfig(format!("expected a gateway address, got: {}", router))
            })?;
            let route = StaticRoute { dest, router };
            info!(dest = %route.dest, router = %route.router, "adding static route");
            routes.push(route);
        }
        info!("loaded {} static routes", routes.len());
        Ok(Arc::new(Self { routes }))
    }
}

#[async_trait]
impl Handler for StaticRouteHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if req.is_option_requested(OptionCode::ClasslessStaticRoute) {
            resp.update_option(v4::DhcpOption::ClasslessStaticRoute(self.routes.clone()));
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        // Static routes do not apply to DHCPv6, so just continue.
        next.call(req, resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_parsing() {
        let handler = StaticRouteHandler::provision(&StaticRouteConfig {
            routes: vec!["10.0.0.0/8,192.168.1.1".to_string()],
        })
        .unwrap();
        assert_eq!(handler.routes.len(), 1);
        assert_eq!(handler.routes[0].router, Ipv4Addr::new(192, 168, 1, 1));

        assert!(StaticRouteHandler::provision(&StaticRouteConfig {
            routes: vec!["10.0.0.0/8".to_string()],
        })
        .is_err());
        assert!(StaticRouteHandler::provision(&StaticRouteConfig {
            routes: vec!["not-a-subnet,192.168.1.1".to_string()],
        })
        .is_err());
    }
}

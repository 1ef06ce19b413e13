//! Sets the DNS search-domain list when the client asks for it.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{Handler, Next4, Next6};
use crate::error::Result;
use crate::v4::{self, Dhcpv4Packet, OptionCode};
use crate::v6::{self, Dhcpv6Message};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchDomainsConfig {
    #[serde(default)]
    pub domains: Vec<String>,
}

pub struct SearchDomainsHandler {
    domains: Vec<String>,
}

impl SearchDomainsHandler {
    pub fn provision(config: &SearchDomainsConfig) -> Arc<Self> {
        Arc::new(Self {
            domains: config.domains.clone(),
        })
    }
}

#[async_trait]
impl Handler for SearchDomainsHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if req.is_option_requested(OptionCode::DomainSearch) {
            resp.update_option(v4::DhcpOption::DomainSearch(self.domains.clone()));
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        if req.is_option_requested(v6::option_code::DOMAIN_SEARCH_LIST) {
            resp.update_option(v6::DhcpOption::DomainSearchList(self.domains.clone()));
        }
        next.call(req, resp).await
    }
}

//! Network Boot Program selection.
//!
//! Boot URLs are configured in a table whose keys are, in lookup order:
//! client MAC (DHCPv4) or hex DUID (DHCPv6), class/vendor-class identifier,
//! and numeric client architecture type. Boot information is only offered to
//! clients that requested it.
//!
//! For DHCPv4 a `tftp://` URL is split into TFTP server name (option 66)
//! and bootfile name (option 67); anything else is sent whole in option 67.
//! For DHCPv6 the URL goes out unmodified in the bootfile-URL option, and a
//! `param` query value is duplicated into the bootfile-param option when the
//! client asked for it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::{hex_encode, Handler, Next4, Next6};
use crate::error::{Error, Result};
use crate::v4::{self, Dhcpv4Packet, OptionCode};
use crate::v6::{self, Dhcpv6Message};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NbpConfig {
    pub urls: HashMap<String, String>,
}

pub struct NbpHandler {
    urls: HashMap<String, Url>,
}

impl NbpHandler {
    pub fn provision(config: &NbpConfig) -> Result<Arc<Self>> {
        let mut urls = HashMap::new();
        for (key, value) in &config.urls {
            let url = Url::parse(value).map_err(|error| {
                Error::InvalidConfig(format!("invalid boot url {}: {}", value, error))
            })?;
            urls.insert(key.clone(), url);
        }
        Ok(Arc::new(Self { urls }))
    }

    fn select(&self, id: Option<&str>, class_id: Option<&str>, arch: Option<u16>) -> Option<&Url> {
        if let Some(url) = id.and_then(|id| self.urls.get(id)) {
            return Some(url);
        }
        if let Some(url) = class_id.and_then(|class| self.urls.get(class)) {
            return Some(url);
        }
        arch.and_then(|arch| self.urls.get(&arch.to_string()))
    }
}

#[async_trait]
impl Handler for NbpHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        if !req.is_option_requested(OptionCode::BootfileName) {
            return next.call(req, resp).await;
        }

        let mac = req.mac_address();
        let class_id = req.class_identifier();
        let arch = req.client_arch_types().and_then(|types| types.first().copied());

        let Some(url) = self.select(Some(&mac), class_id, arch) else {
            warn!(mac = %mac, class_id = ?class_id, arch = ?arch, "no boot url found");
            return next.call(req, resp).await;
        };

        info!(mac = %mac, class_id = ?class_id, arch = ?arch, url = %url, "offering boot url");
        match url.scheme() {
            "tftp" => {
                resp.update_option(v4::DhcpOption::TftpServerName(
                    url.host_str().unwrap_or_default().to_string(),
                ));
                resp.update_option(v4::DhcpOption::BootfileName(url.path().to_string()));
            }
            _ => {
                resp.update_option(v4::DhcpOption::BootfileName(url.to_string()));
            }
        }
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        if !req.is_option_requested(v6::option_code::BOOTFILE_URL) {
            return next.call(req, resp).await;
        }

        let duid = req.client_id().map(hex_encode);
        let vendor_classes = req.vendor_classes();
        let class_id = vendor_classes
            .first()
            .and_then(|class| class.data.first())
            .map(|data| String::from_utf8_lossy(data).to_string());
        let arch = req.arch_types().and_then(|types| types.first().copied());

        let Some(url) = self.select(duid.as_deref(), class_id.as_deref(), arch) else {
            warn!(duid = ?duid, class_id = ?class_id, arch = ?arch, "no boot url found");
            return next.call(req, resp).await;
        };

        info!(duid = ?duid, class_id = ?class_id, arch = ?arch, url = %url, "offering boot url");
        if req.is_option_requested(v6::option_code::VENDOR_CLASS) {
            for class in &vendor_classes {
                resp.add_option(v6::DhcpOption::VendorClass((*class).clone()));
            }
        }
        resp.update_option(v6::DhcpOption::BootfileUrl(url.to_string()));
        if req.is_option_requested(v6::option_code::BOOTFILE_PARAM) {
            let param = url
                .query_pairs()
                .find(|(key, _)| key == "param")
                .map(|(_, value)| value.to_string())
                .unwrap_or_default();
            resp.update_option(v6::DhcpOption::BootfileParam(vec![param]));
        }
        next.call(req, resp).await
    }
}

//! DHCPv6 prefix delegation (IA_PD).
//!
//! Each request IA_PD gets one IA_PD response with the same IAID. Client
//! hints are reconciled against the prefixes this client already holds in
//! three passes: exact matches are refreshed first, then empty hints soak up
//! the remaining known leases, and only then does the allocator hand out new
//! blocks. An IA_PD that ends up empty carries a NoPrefixAvail status.

use std::collections::HashMap;
use std::net::Ipv6Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ipnet::{IpNet, Ipv6Net};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;

use super::{hex_encode, Handler, Next4, Next6};
use crate::allocator::{Allocator, Ipv6PrefixAllocator};
use crate::error::Result;
use crate::v4::Dhcpv4Packet;
use crate::v6::{self, Dhcpv6Message, IaPd, IaPrefix, StatusCode};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixConfig {
    /// The pool all delegated prefixes are carved from.
    pub prefix: Ipv6Net,

    /// Length of the delegated prefixes.
    #[serde(rename = "allocationSize")]
    pub allocation_size: u8,

    #[serde(
        rename = "leaseTime",
        default = "default_lease_time",
        with = "humantime_serde"
    )]
    pub lease_time: Duration,
}

fn default_lease_time() -> Duration {
    Duration::from_secs(3600)
}

#[derive(Debug, Clone)]
struct PrefixLease {
    prefix: Ipv6Net,
    expire: Instant,
}

/// A client hint; `None` is the synthetic empty hint, which matches nothing
/// exactly but accepts any prefix.
type Hint = Option<(Ipv6Addr, u8)>;

pub struct PrefixHandler {
    allocator: Ipv6PrefixAllocator,
    records: RwLock<HashMap<String, Vec<PrefixLease>>>,
    lease_time: Duration,
}

impl PrefixHandler {
    pub fn provision(config: &PrefixConfig) -> Result<Arc<Self>> {
        let allocator = Ipv6PrefixAllocator::new(config.prefix, config.allocation_size)?;
        Ok(Arc::new(Self {
            allocator,
            records: RwLock::new(HashMap::new()),
            lease_time: config.lease_time,
        }))
    }

    fn delegate(&self, iapd: &IaPd, known: &mut Vec<PrefixLease>, now: Instant) -> IaPd {
        let mut response = IaPd {
            iaid: iapd.iaid,
            t1: 0,
            t2: 0,
            options: Vec::new(),
        };

        let mut hints: Vec<Hint> = iapd
            .options
            .iter()
            .filter_map(|option| match option {
                v6::DhcpOption::IaPrefix(prefix) => Some(Some((prefix.prefix, prefix.prefix_len))),
                _ => None,
            })
            .collect();
        if hints.is_empty() {
            // No IAPrefix hint is still a valid IA_PD request, just
            // unspecified; an empty hint asks for any prefix.
            hints.push(None);
        }

        let mut satisfied = vec![false; hints.len()];
        let mut given_out = vec![false; known.len()];
        let refreshed = now + self.lease_time;

        // Pass A: leases that exactly match a hint are refreshed. The exact
        // match is the safest pairing, so it runs before anything else.
        for (hint_idx, hint) in hints.iter().enumerate() {
            for lease_idx in 0..known.len() {
                if same_prefix(*hint, known[lease_idx].prefix) {
                    if known[lease_idx].expire < refreshed {
                        known[lease_idx].expire = refreshed;
                    }
                    satisfied[hint_idx] = true;
                    given_out[lease_idx] = true;
                    add_prefix(&mut response, &known[lease_idx], now);
                }
            }
        }

        // Pass B: empty hints take over whatever this client already holds.
        // A hint that names a length only is matched against leases of that
        // length.
        for (hint_idx, hint) in hints.iter().enumerate() {
            let empty = match hint {
                None => true,
                Some((addr, _)) => addr.is_unspecified(),
            };
            if satisfied[hint_idx] || !empty {
                continue;
            }
            let wanted_len = hint.map(|(_, len)| len).unwrap_or(0);
            for lease_idx in 0..known.len() {
                if given_out[lease_idx] {
                    continue;
                }
                if wanted_len != 0 && known[lease_idx].prefix.prefix_len() != wanted_len {
                    continue;
                }
                if known[lease_idx].expire < refreshed {
                    known[lease_idx].expire = refreshed;
                }
                satisfied[hint_idx] = true;
                given_out[lease_idx] = true;
                add_prefix(&mut response, &known[lease_idx], now);
            }
        }

        // Pass C: whatever is still unsatisfied gets a fresh allocation.
        // Allocator refusals leave the hint unsatisfied; the client learns
        // about it through the status code below.
        for (hint_idx, hint) in hints.iter().enumerate() {
            if satisfied[hint_idx] {
                continue;
            }
            let allocator_hint = match hint {
                None => None,
                Some((addr, 0)) if addr.is_unspecified() => None,
                Some((addr, len)) => match Ipv6Net::new(*addr, *len) {
                    Ok(net) => Some(IpNet::V6(net)),
                    Err(_) => {
                        debug!(hint = ?hint, "ignoring unparseable prefix hint");
                        continue;
                    }
                },
            };
            match self.allocator.allocate(allocator_hint) {
                Ok(IpNet::V6(net)) => {
                    let lease = PrefixLease {
                        prefix: net,
                        expire: refreshed,
                    };
                    add_prefix(&mut response, &lease, now);
                    debug!(prefix = %net, iaid = iapd.iaid, "allocated prefix");
                    known.push(lease);
                }
                Ok(IpNet::V4(net)) => {
                    debug!(net = %net, "prefix allocator returned a non-IPv6 block");
                }
                Err(error) => {
                    debug!(hint = ?hint, error = %error, "nothing allocated for hinted prefix");
                }
            }
        }

        if response.options.is_empty() {
            debug!(iaid = iapd.iaid, "no valid prefix to return for IAID");
            response.options.push(v6::DhcpOption::StatusCode(StatusCode {
                code: v6::status::NO_PREFIX_AVAIL,
                message: String::new(),
            }));
        }

        response
    }

    #[cfg(test)]
    pub(crate) fn allocator(&self) -> &Ipv6PrefixAllocator {
        &self.allocator
    }
}

#[async_trait]
impl Handler for PrefixHandler {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()> {
        // Prefix delegation does not apply to DHCPv4, so just continue.
        next.call(req, resp).await
    }

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()> {
        let Some(client_id) = req.client_id() else {
            debug!("no client identifier in request");
            return next.call(req, resp).await;
        };
        let duid = hex_encode(client_id);

        {
            let mut records = self.records.write().await;
            let known = records.entry(duid).or_default();
            let now = Instant::now();
            for iapd in req.iapd() {
                let response = self.delegate(iapd, known, now);
                resp.add_option(v6::DhcpOption::IaPd(response));
            }
        }

        next.call(req, resp).await
    }
}

/// True when both prefixes are defined and equal. The empty hint is equal to
/// nothing, not even itself.
fn same_prefix(hint: Hint, lease: Ipv6Net) -> bool {
    match hint {
        None => false,
        Some((addr, len)) => addr == lease.addr() && len == lease.prefix_len(),
    }
}

fn add_prefix(response: &mut IaPd, lease: &PrefixLease, now: Instant) {
    let lifetime = lease.expire.saturating_duration_since(now).as_secs() as u32;
    response.options.push(v6::DhcpOption::IaPrefix(IaPrefix {
        preferred: lifetime,
        valid: lifetime,
        prefix_len: lease.prefix.prefix_len(),
        prefix: lease.prefix.addr(),
        options: Vec::new(),
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::HandlerChain;
    use crate::v6::MessageType;

    fn provision(prefix: &str, size: u8) -> Arc<PrefixHandler> {
        PrefixHandler::provision(&PrefixConfig {
            prefix: prefix.parse().unwrap(),
            allocation_size: size,
            lease_time: Duration::from_secs(3600),
        })
        .unwrap()
    }

    fn solicit(duid: &[u8], iapds: Vec<IaPd>) -> Dhcpv6Message {
        let mut message = Dhcpv6Message::new(MessageType::Solicit);
        message.xid = [1, 2, 3];
        message.add_option(v6::DhcpOption::ClientId(duid.to_vec()));
        for iapd in iapds {
            message.add_option(v6::DhcpOption::IaPd(iapd));
        }
        message
    }

    fn empty_iapd(iaid: u32) -> IaPd {
        IaPd {
            iaid,
            t1: 0,
            t2: 0,
            options: vec![],
        }
    }

    fn delegated_prefixes(resp: &Dhcpv6Message) -> Vec<(u32, Vec<IaPrefix>)> {
        resp.iapd()
            .into_iter()
            .map(|iapd| {
                let prefixes = iapd
                    .options
                    .iter()
                    .filter_map(|option| match option {
                        v6::DhcpOption::IaPrefix(prefix) => Some(prefix.clone()),
                        _ => None,
                    })
                    .collect();
                (iapd.iaid, prefixes)
            })
            .collect()
    }

    async fn run(handler: &Arc<PrefixHandler>, req: &Dhcpv6Message) -> Dhcpv6Message {
        let chain = HandlerChain::new(vec![Arc::clone(handler) as Arc<dyn Handler>]);
        let mut resp = Dhcpv6Message::reply_to(MessageType::Advertise, req);
        chain.handle6(req, &mut resp).await.unwrap();
        resp
    }

    #[tokio::test]
    async fn test_empty_hint_gets_a_fresh_prefix() {
        let handler = provision("2001:db8::/32", 64);
        let req = solicit(&[0, 1, 0, 1], vec![empty_iapd(42)]);
        let resp = run(&handler, &req).await;

        let delegated = delegated_prefixes(&resp);
        assert_eq!(delegated.len(), 1);
        let (iaid, prefixes) = &delegated[0];
        assert_eq!(*iaid, 42);
        assert_eq!(prefixes.len(), 1);
        assert_eq!(prefixes[0].prefix_len, 64);
        assert!(
            "2001:db8::/32"
                .parse::<Ipv6Net>()
                .unwrap()
                .contains(&prefixes[0].prefix)
        );
        assert_eq!(prefixes[0].preferred, 3600);
        assert_eq!(prefixes[0].valid, 3600);
    }

    #[tokio::test]
    async fn test_repeat_solicit_reuses_the_prefix() {
        let handler = provision("2001:db8::/32", 64);
        let duid = [0, 1, 0, 1, 9, 9];

        let first = run(&handler, &solicit(&duid, vec![empty_iapd(1)])).await;
        let second = run(&handler, &solicit(&duid, vec![empty_iapd(1)])).await;

        let first_prefix = &delegated_prefixes(&first)[0].1[0];
        let second_prefix = &delegated_prefixes(&second)[0].1[0];
        assert_eq!(first_prefix.prefix, second_prefix.prefix);
        assert_eq!(first_prefix.prefix_len, second_prefix.prefix_len);
        // Only refreshed, never re-allocated.
        assert_eq!(handler.allocator().used(), 1);
        assert!(second_prefix.valid >= first_prefix.valid);
    }

    #[tokio::test]
    async fn test_exact_hint_is_honored() {
        let handler = provision("2001:db8::/48", 64);
        let hint = IaPd {
            iaid: 7,
            t1: 0,
            t2: 0,
            options: vec![v6::DhcpOption::IaPrefix(IaPrefix {
                preferred: 0,
                valid: 0,
                prefix_len: 64,
                prefix: "2001:db8:0:7::".parse().unwrap(),
                options: vec![],
            })],
        };
        let resp = run(&handler, &solicit(&[1, 2, 3], vec![hint])).await;

        let delegated = delegated_prefixes(&resp);
        assert_eq!(
            delegated[0].1[0].prefix,
            "2001:db8:0:7::".parse::<Ipv6Addr>().unwrap()
        );
    }

    #[tokio::test]
    async fn test_exhausted_pool_reports_no_prefix_avail() {
        // A /64 pool of /64 blocks has exactly one slot.
        let handler = provision("2001:db8::/64", 64);

        run(&handler, &solicit(&[1], vec![empty_iapd(1)])).await;
        let starved = run(&handler, &solicit(&[2], vec![empty_iapd(2)])).await;

        let iapds = starved.iapd();
        assert_eq!(iapds.len(), 1);
        assert!(delegated_prefixes(&starved)[0].1.is_empty());
        let Some(v6::DhcpOption::StatusCode(status)) = iapds[0]
            .options
            .iter()
            .find(|option| option.code() == v6::option_code::STATUS_CODE)
        else {
            panic!("expected a status code");
        };
        assert_eq!(status.code, v6::status::NO_PREFIX_AVAIL);
    }

    #[tokio::test]
    async fn test_each_iapd_gets_its_own_response() {
        let handler = provision("2001:db8::/32", 64);
        let resp = run(
            &handler,
            &solicit(&[5, 5], vec![empty_iapd(10), empty_iapd(20)]),
        )
        .await;

        let delegated = delegated_prefixes(&resp);
        assert_eq!(delegated.len(), 2);
        assert_eq!(delegated[0].0, 10);
        assert_eq!(delegated[1].0, 20);
        assert_ne!(delegated[0].1[0].prefix, delegated[1].1[0].prefix);
        assert_eq!(handler.allocator().used(), 2);
    }

    #[test]
    fn test_same_prefix_is_non_reflexive_on_empty() {
        let lease: Ipv6Net = "2001:db8::/64".parse().unwrap();
        assert!(!same_prefix(None, lease));
        assert!(same_prefix(
            Some(("2001:db8::".parse().unwrap(), 64)),
            lease
        ));
        assert!(!same_prefix(
            Some(("2001:db8::".parse().unwrap(), 56)),
            lease
        ));
    }
}

//! The handler contract and the chain that composes handlers.
//!
//! A handler responds to a DHCPv4 or DHCPv6 request. Handlers which act as
//! middleware should call `next` so the request propagates down the chain;
//! handlers which act as responders need not invoke `next`, and returning
//! without doing so completes the request normally. If a handler encounters
//! an error it should be returned for proper handling; errors received from
//! `next` must be propagated unchanged, never re-wrapped.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::v4::Dhcpv4Packet;
use crate::v6::Dhcpv6Message;

pub mod autoconfigure;
pub mod dns;
pub mod example;
pub mod file;
pub mod ipv6only;
pub mod leasetime;
pub mod messagelog;
pub mod mtu;
pub mod nbp;
pub mod netmask;
pub mod prefix;
pub mod range;
pub mod router;
pub mod searchdomains;
pub mod serverid;
pub mod sleep;
pub mod staticroute;

/// Hex-encodes a client identifier for use as a lookup key.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle4(
        &self,
        req: &Dhcpv4Packet,
        resp: &mut Dhcpv4Packet,
        next: Next4<'_>,
    ) -> Result<()>;

    async fn handle6(
        &self,
        req: &Dhcpv6Message,
        resp: &mut Dhcpv6Message,
        next: Next6<'_>,
    ) -> Result<()>;
}

/// The continuation a handler invokes to run the rest of the chain.
///
/// Holds the not-yet-run tail of the handler sequence and advances by
/// splitting off its head, so each handler sees exactly the handlers after
/// it. The empty tail is the terminal no-op.
pub struct Next4<'a> {
    handlers: &'a [Arc<dyn Handler>],
}

impl<'a> Next4<'a> {
    pub async fn call(self, req: &Dhcpv4Packet, resp: &mut Dhcpv4Packet) -> Result<()> {
        match self.handlers.split_first() {
            Some((handler, rest)) => {
                handler
                    .handle4(req, resp, Next4 { handlers: rest })
                    .await
            }
            None => Ok(()),
        }
    }
}

pub struct Next6<'a> {
    handlers: &'a [Arc<dyn Handler>],
}

impl<'a> Next6<'a> {
    pub async fn call(self, req: &Dhcpv6Message, resp: &mut Dhcpv6Message) -> Result<()> {
        match self.handlers.split_first() {
            Some((handler, rest)) => {
                handler
                    .handle6(req, resp, Next6 { handlers: rest })
                    .await
            }
            None => Ok(()),
        }
    }
}

/// An ordered sequence of handlers behaving as one handler.
///
/// Requests flow from the first handler to the last; responses flow back up
/// as each handler's code after its `next` call runs in reverse order.
#[derive(Clone)]
pub struct HandlerChain {
    handlers: Arc<Vec<Arc<dyn Handler>>>,
}

impl HandlerChain {
    pub fn new(handlers: Vec<Arc<dyn Handler>>) -> Self {
        Self {
            handlers: Arc::new(handlers),
        }
    }

    pub async fn handle4(&self, req: &Dhcpv4Packet, resp: &mut Dhcpv4Packet) -> Result<()> {
        Next4 {
            handlers: &self.handlers,
        }
        .call(req, resp)
        .await
    }

    pub async fn handle6(&self, req: &Dhcpv6Message, resp: &mut Dhcpv6Message) -> Result<()> {
        Next6 {
            handlers: &self.handlers,
        }
        .call(req, resp)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::v4::MessageType;
    use std::sync::Mutex;

    /// Records entry and post-processing events, optionally misbehaving.
    struct Probe {
        name: &'static str,
        events: Arc<Mutex<Vec<String>>>,
        short_circuit: bool,
        fail: bool,
    }

    impl Probe {
        fn new(name: &'static str, events: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                events,
                short_circuit: false,
                fail: false,
            })
        }

        fn failing(name: &'static str, events: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                events,
                short_circuit: false,
                fail: true,
            })
        }

        fn stopping(name: &'static str, events: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                name,
                events,
                short_circuit: true,
                fail: false,
            })
        }

        fn record(&self, what: &str) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{}", self.name, what));
        }
    }

    #[async_trait]
    impl Handler for Probe {
        async fn handle4(
            &self,
            req: &Dhcpv4Packet,
            resp: &mut Dhcpv4Packet,
            next: Next4<'_>,
        ) -> Result<()> {
            self.record("enter");
            if self.fail {
                return Err(Error::Handler(self.name.to_string()));
            }
            if self.short_circuit {
                return Ok(());
            }
            let result = next.call(req, resp).await;
            self.record("post");
            result
        }

        async fn handle6(
            &self,
            req: &Dhcpv6Message,
            resp: &mut Dhcpv6Message,
            next: Next6<'_>,
        ) -> Result<()> {
            self.record("enter");
            if self.fail {
                return Err(Error::Handler(self.name.to_string()));
            }
            if self.short_circuit {
                return Ok(());
            }
            let result = next.call(req, resp).await;
            self.record("post");
            result
        }
    }

    fn test_request() -> Dhcpv4Packet {
        let mut packet = Dhcpv4Packet::create_reply(&blank());
        packet.op = crate::v4::BOOTREQUEST;
        packet.update_option(crate::v4::DhcpOption::MessageType(MessageType::Discover));
        packet
    }

    fn blank() -> Dhcpv4Packet {
        Dhcpv4Packet {
            op: crate::v4::BOOTREQUEST,
            htype: 1,
            hlen: 6,
            hops: 0,
            xid: 1,
            secs: 0,
            flags: 0,
            ciaddr: std::net::Ipv4Addr::UNSPECIFIED,
            yiaddr: std::net::Ipv4Addr::UNSPECIFIED,
            siaddr: std::net::Ipv4Addr::UNSPECIFIED,
            giaddr: std::net::Ipv4Addr::UNSPECIFIED,
            chaddr: [0; 16],
            sname: [0; 64],
            file: [0; 128],
            options: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_request_order_forward_response_order_reverse() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::new(vec![
            Probe::new("a", Arc::clone(&events)),
            Probe::new("b", Arc::clone(&events)),
            Probe::new("c", Arc::clone(&events)),
        ]);

        let req = test_request();
        let mut resp = Dhcpv4Packet::create_reply(&req);
        chain.handle4(&req, &mut resp).await.unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["a:enter", "b:enter", "c:enter", "c:post", "b:post", "a:post"]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_skips_later_handlers() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::new(vec![
            Probe::new("a", Arc::clone(&events)),
            Probe::stopping("b", Arc::clone(&events)),
            Probe::new("c", Arc::clone(&events)),
        ]);

        let req = test_request();
        let mut resp = Dhcpv4Packet::create_reply(&req);
        chain.handle4(&req, &mut resp).await.unwrap();

        assert_eq!(*events.lock().unwrap(), vec!["a:enter", "b:enter", "a:post"]);
    }

    #[tokio::test]
    async fn test_error_aborts_and_propagates_unchanged() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let chain = HandlerChain::new(vec![
            Probe::new("a", Arc::clone(&events)),
            Probe::failing("b", Arc::clone(&events)),
            Probe::new("c", Arc::clone(&events)),
        ]);

        let req = test_request();
        let mut resp = Dhcpv4Packet::create_reply(&req);
        let result = chain.handle4(&req, &mut resp).await;

        assert!(matches!(result, Err(Error::Handler(name)) if name == "b"));
        // c never entered; a's post-processing still ran.
        assert_eq!(*events.lock().unwrap(), vec!["a:enter", "b:enter", "a:post"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_a_noop() {
        let chain = HandlerChain::new(Vec::new());
        let req = test_request();
        let mut resp = Dhcpv4Packet::create_reply(&req);
        assert!(chain.handle4(&req, &mut resp).await.is_ok());
    }
}

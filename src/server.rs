//! Listeners, the per-datagram dispatcher and the server lifecycle.
//!
//! `App::provision` compiles every configured server (handler chains
//! included) before a single socket is bound; `start` then binds one UDP
//! socket per (server, interface, address) tuple and runs a read loop per
//! socket. Each datagram is handled on its own task: decode, build the reply
//! skeleton for the request's message type, run the handler chain, serialize
//! and send — re-encapsulated through the relay chain when the request came
//! through DHCPv6 relays.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Instant;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::config::{Config, HandlerConfig};
use crate::error::{Error, Result};
use crate::handlers::{self, Handler, HandlerChain};
use crate::v4::{self, Dhcpv4Packet};
use crate::v6::{self, Dhcpv6Message, Dhcpv6Packet};

const RECV_BUFFER_SIZE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    V4,
    V6,
}

/// One named server: its bind points and its compiled handler chain.
pub struct DhcpServer {
    name: String,
    interfaces: Vec<String>,
    addresses: Vec<SocketAddr>,
    chain: HandlerChain,
    access_log: bool,
}

/// All configured servers plus the listener tasks once started.
pub struct App {
    servers: Vec<Arc<DhcpServer>>,
    tasks: JoinSet<Result<()>>,
    shutdown: watch::Sender<bool>,
}

impl App {
    /// Validates the whole configuration and provisions every handler.
    /// Nothing is bound yet; any error here aborts before the first socket.
    pub async fn provision(config: Config) -> Result<Self> {
        config.validate()?;

        let mut servers = Vec::new();
        for (name, server_config) in &config.servers {
            let chain = compile_chain(&server_config.handle).await?;
            servers.push(Arc::new(DhcpServer {
                name: name.clone(),
                interfaces: server_config.resolved_interfaces(),
                addresses: server_config.resolved_addresses()?,
                chain,
                access_log: server_config.logs,
            }));
        }

        let (shutdown, _) = watch::channel(false);
        Ok(Self {
            servers,
            tasks: JoinSet::new(),
            shutdown,
        })
    }

    /// Binds every listener and spawns its read loop. A bind failure is
    /// fatal and reported immediately.
    pub fn start(&mut self) -> Result<()> {
        for server in &self.servers {
            for interface in &server.interfaces {
                for address in &server.addresses {
                    let socket = bind_socket(*address, interface)?;
                    let family = if address.is_ipv4() {
                        Family::V4
                    } else {
                        Family::V6
                    };
                    let server = Arc::clone(server);
                    let shutdown = self.shutdown.subscribe();
                    self.tasks
                        .spawn(run_listener(server, socket, family, shutdown));
                }
            }
            info!(
                name = %server.name,
                interfaces = ?server.interfaces,
                addresses = ?server.addresses,
                "server running"
            );
        }
        Ok(())
    }

    /// Signals every listener to exit and waits for them, returning the
    /// first error any of them produced. In-flight handle tasks are left to
    /// finish on their own.
    pub async fn stop(&mut self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let result = match joined {
                Ok(result) => result,
                Err(join_error) => Err(Error::Handler(format!(
                    "listener task panicked: {}",
                    join_error
                ))),
            };
            if let Err(error) = result {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        for server in &self.servers {
            info!(name = %server.name, "server stopped");
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Builds the handler chain for one server. This match is the handler
/// factory: every configurable handler is constructed here, explicitly.
async fn compile_chain(configs: &[HandlerConfig]) -> Result<HandlerChain> {
    let mut chain: Vec<Arc<dyn Handler>> = Vec::new();
    for config in configs {
        let handler = match config {
            HandlerConfig::File(c) => {
                handlers::file::FileHandler::provision(c).await? as Arc<dyn Handler>
            }
            HandlerConfig::Range(c) => {
                handlers::range::RangeHandler::provision(c).await? as Arc<dyn Handler>
            }
            HandlerConfig::Prefix(c) => {
                handlers::prefix::PrefixHandler::provision(c)? as Arc<dyn Handler>
            }
            HandlerConfig::Serverid(c) => {
                handlers::serverid::ServerIdHandler::provision(c)? as Arc<dyn Handler>
            }
            HandlerConfig::Autoconfigure(c) => {
                handlers::autoconfigure::AutoConfigureHandler::provision(c) as Arc<dyn Handler>
            }
            HandlerConfig::Ipv6only(c) => {
                handlers::ipv6only::Ipv6OnlyHandler::provision(c) as Arc<dyn Handler>
            }
            HandlerConfig::Nbp(c) => handlers::nbp::NbpHandler::provision(c)? as Arc<dyn Handler>,
            HandlerConfig::Leasetime(c) => {
                handlers::leasetime::LeaseTimeHandler::provision(c) as Arc<dyn Handler>
            }
            HandlerConfig::Mtu(c) => handlers::mtu::MtuHandler::provision(c) as Arc<dyn Handler>,
            HandlerConfig::Netmask(c) => {
                handlers::netmask::NetmaskHandler::provision(c)? as Arc<dyn Handler>
            }
            HandlerConfig::Router(c) => {
                handlers::router::RouterHandler::provision(c)? as Arc<dyn Handler>
            }
            HandlerConfig::Dns(c) => handlers::dns::DnsHandler::provision(c) as Arc<dyn Handler>,
            HandlerConfig::Searchdomains(c) => {
                handlers::searchdomains::SearchDomainsHandler::provision(c) as Arc<dyn Handler>
            }
            HandlerConfig::Staticroute(c) => {
                handlers::staticroute::StaticRouteHandler::provision(c)? as Arc<dyn Handler>
            }
            HandlerConfig::Sleep(c) => {
                handlers::sleep::SleepHandler::provision(c) as Arc<dyn Handler>
            }
            HandlerConfig::Example(c) => {
                handlers::example::ExampleHandler::provision(c) as Arc<dyn Handler>
            }
            HandlerConfig::Messagelog(c) => {
                handlers::messagelog::MessageLogHandler::provision(c) as Arc<dyn Handler>
            }
        };
        chain.push(handler);
    }
    Ok(HandlerChain::new(chain))
}

fn bind_socket(address: SocketAddr, interface: &str) -> Result<Socket> {
    let domain = if address.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
        .map_err(|error| Error::Socket(format!("failed to create socket: {}", error)))?;

    socket
        .set_reuse_address(true)
        .map_err(|error| Error::Socket(format!("failed to set SO_REUSEADDR: {}", error)))?;

    if address.is_ipv4() {
        socket
            .set_broadcast(true)
            .map_err(|error| Error::Socket(format!("failed to set SO_BROADCAST: {}", error)))?;
    }

    socket
        .set_nonblocking(true)
        .map_err(|error| Error::Socket(format!("failed to set non-blocking: {}", error)))?;

    if !interface.is_empty() {
        #[cfg(target_os = "linux")]
        socket
            .bind_device(Some(interface.as_bytes()))
            .map_err(|error| {
                Error::Socket(format!("failed to bind to device {}: {}", interface, error))
            })?;
        #[cfg(not(target_os = "linux"))]
        warn!(
            interface = %interface,
            "binding to a named interface is only supported on Linux and will be ignored"
        );
    }

    socket
        .bind(&address.into())
        .map_err(|error| Error::Socket(format!("failed to bind to {}: {}", address, error)))?;

    if let SocketAddr::V6(_) = address {
        // Well-known DHCPv6 server groups. Failure to join is survivable:
        // unicast and relayed traffic still arrives.
        for group in [
            v6::MULTICAST_RELAY_AGENTS_AND_SERVERS,
            v6::MULTICAST_ALL_SERVERS,
        ] {
            if let Err(error) = socket.join_multicast_v6(&group, 0) {
                warn!(group = %group, error = %error, "failed to join multicast group");
            }
        }
    }

    Ok(socket)
}

async fn run_listener(
    server: Arc<DhcpServer>,
    socket: Socket,
    family: Family,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let std_socket: std::net::UdpSocket = socket.into();
    let socket = Arc::new(
        UdpSocket::from_std(std_socket)
            .map_err(|error| Error::Socket(format!("failed to register socket: {}", error)))?,
    );

    let mut buffer = [0u8; RECV_BUFFER_SIZE];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => {
                match received {
                    Ok((len, peer)) => {
                        let data = buffer[..len].to_vec();
                        let server = Arc::clone(&server);
                        let socket = Arc::clone(&socket);
                        tokio::spawn(async move {
                            server.handle_datagram(socket, peer, data, family).await;
                        });
                    }
                    Err(error) => {
                        error!(name = %server.name, error = %error, "error receiving packet");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!(name = %server.name, "listener shutting down");
                    return Ok(());
                }
            }
        }
    }
}

impl DhcpServer {
    async fn handle_datagram(
        &self,
        socket: Arc<UdpSocket>,
        peer: SocketAddr,
        data: Vec<u8>,
        family: Family,
    ) {
        let started = Instant::now();
        let (message_type, bytes_written) = match family {
            Family::V4 => self.handle4(&socket, peer, &data).await,
            Family::V6 => self.handle6(&socket, peer, &data).await,
        };
        if self.access_log {
            info!(
                target: "access",
                remote_ip = %peer.ip(),
                remote_port = peer.port(),
                message_type = %message_type,
                bytes_written,
                duration = ?started.elapsed(),
                "handled request"
            );
        }
    }

    async fn handle4(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        data: &[u8],
    ) -> (String, usize) {
        let req = match Dhcpv4Packet::parse(data) {
            Ok(req) => req,
            Err(error) => {
                warn!(peer = %peer, error = %error, "failed to parse DHCPv4 packet");
                return ("INVALID".to_string(), 0);
            }
        };
        debug!(message = %req.summary(), "received message");
        let message_type = req
            .message_type()
            .map(|msg_type| msg_type.to_string())
            .unwrap_or_else(|| "UNKNOWN".to_string());

        let mut resp = Dhcpv4Packet::create_reply(&req);
        match req.message_type() {
            Some(v4::MessageType::Discover) => {
                resp.update_option(v4::DhcpOption::MessageType(v4::MessageType::Offer));
            }
            Some(v4::MessageType::Request) => {
                resp.update_option(v4::DhcpOption::MessageType(v4::MessageType::Ack));
            }
            other => {
                debug!(message_type = ?other, "unhandled message type");
                return (message_type, 0);
            }
        }

        match self.chain.handle4(&req, &mut resp).await {
            Ok(()) => {}
            Err(Error::Drop) => {
                debug!("request dropped without a reply");
                return (message_type, 0);
            }
            Err(error) => {
                error!(error = %error, "handler chain failed");
                return (message_type, 0);
            }
        }

        // A peer with the zero address cannot be unicast to; fall back to
        // broadcast on the same port.
        let destination = match peer {
            SocketAddr::V4(v4_peer) if v4_peer.ip().is_unspecified() => {
                SocketAddr::new(IpAddr::V4(Ipv4Addr::BROADCAST), peer.port())
            }
            other => other,
        };

        let encoded = resp.encode();
        match socket.send_to(&encoded, destination).await {
            Ok(written) => {
                debug!(message = %resp.summary(), "send message");
                (message_type, written)
            }
            Err(error) => {
                error!(error = %error, "failed to send response");
                (message_type, 0)
            }
        }
    }

    async fn handle6(
        &self,
        socket: &UdpSocket,
        peer: SocketAddr,
        data: &[u8],
    ) -> (String, usize) {
        let outer = match Dhcpv6Packet::parse(data) {
            Ok(outer) => outer,
            Err(error) => {
                warn!(peer = %peer, error = %error, "failed to parse DHCPv6 packet");
                return ("INVALID".to_string(), 0);
            }
        };
        let message_type = outer.msg_type().to_string();

        let inner = match outer.inner_message() {
            Ok(inner) => inner,
            Err(error) => {
                error!(error = %error, "cannot get inner message");
                return (message_type, 0);
            }
        };
        debug!(message = %inner.summary(), "received message");

        let Some(reply_type) = reply_type_for(&inner) else {
            error!(message_type = %inner.msg_type, "message type not supported");
            return (message_type, 0);
        };
        let mut resp = Dhcpv6Message::reply_to(reply_type, &inner);

        match self.chain.handle6(&inner, &mut resp).await {
            Ok(()) => {}
            Err(Error::Drop) => {
                debug!("request dropped without a reply");
                return (message_type, 0);
            }
            Err(error) => {
                error!(error = %error, "handler chain failed");
                return (message_type, 0);
            }
        }

        // Requests that arrived through relays go back the same way.
        let packet = if outer.is_relay() {
            match outer.relay_repl_from_relay_forw(&resp) {
                Ok(packet) => packet,
                Err(error) => {
                    error!(error = %error, "cannot create relay-repl from relay-forw");
                    return (message_type, 0);
                }
            }
        } else {
            Dhcpv6Packet::Message(resp)
        };

        let encoded = packet.encode();
        match socket.send_to(&encoded, peer).await {
            Ok(written) => {
                debug!("send message");
                (message_type, written)
            }
            Err(error) => {
                error!(error = %error, "failed to send response");
                (message_type, 0)
            }
        }
    }
}

/// The reply skeleton's message type for a DHCPv6 request, or `None` when
/// the request type gets no response at all.
fn reply_type_for(inner: &Dhcpv6Message) -> Option<v6::MessageType> {
    match inner.msg_type {
        v6::MessageType::Solicit if inner.rapid_commit() => Some(v6::MessageType::Reply),
        v6::MessageType::Solicit => Some(v6::MessageType::Advertise),
        v6::MessageType::Request
        | v6::MessageType::Confirm
        | v6::MessageType::Renew
        | v6::MessageType::Rebind
        | v6::MessageType::Release
        | v6::MessageType::InformationRequest => Some(v6::MessageType::Reply),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_v6_reply_type_mapping() {
        let mut solicit = Dhcpv6Message::new(v6::MessageType::Solicit);
        assert_eq!(reply_type_for(&solicit), Some(v6::MessageType::Advertise));

        solicit.add_option(v6::DhcpOption::RapidCommit);
        assert_eq!(reply_type_for(&solicit), Some(v6::MessageType::Reply));

        for msg_type in [
            v6::MessageType::Request,
            v6::MessageType::Confirm,
            v6::MessageType::Renew,
            v6::MessageType::Rebind,
            v6::MessageType::Release,
            v6::MessageType::InformationRequest,
        ] {
            assert_eq!(
                reply_type_for(&Dhcpv6Message::new(msg_type)),
                Some(v6::MessageType::Reply)
            );
        }

        assert_eq!(reply_type_for(&Dhcpv6Message::new(v6::MessageType::Reply)), None);
        assert_eq!(
            reply_type_for(&Dhcpv6Message::new(v6::MessageType::Reconfigure)),
            None
        );
    }

    #[tokio::test]
    async fn test_provision_compiles_chains_before_binding() {
        let config: Config = serde_json::from_str(
            r#"{
                "servers": {
                    "srv0": {
                        "addresses": ["127.0.0.1:10067"],
                        "handle": [
                            { "handler": "netmask", "netmask": "255.255.255.0" }
                        ]
                    }
                }
            }"#,
        )
        .unwrap();
        let app = App::provision(config).await.unwrap();
        assert_eq!(app.servers.len(), 1);
    }

    #[tokio::test]
    async fn test_provision_fails_on_bad_handler_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "servers": {
                    "srv0": {
                        "addresses": ["127.0.0.1:10068"],
                        "handle": [
                            { "handler": "netmask", "netmask": "0.255.0.0" }
                        ]
                    }
                }
            }"#,
        )
        .unwrap();
        assert!(App::provision(config).await.is_err());
    }
}

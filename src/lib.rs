pub mod allocator;
pub mod config;
pub mod error;
pub mod handlers;
pub mod server;
pub mod v4;
pub mod v6;

pub use config::{Config, HandlerConfig, ServerConfig};
pub use error::{Error, Result};
pub use handlers::{Handler, HandlerChain, Next4, Next6};
pub use server::App;
pub use v4::Dhcpv4Packet;
pub use v6::{Dhcpv6Message, Dhcpv6Packet};

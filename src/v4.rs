use std::net::Ipv4Addr;

use crate::error::{Error, Result};

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const HLEN_ETHERNET: u8 = 6;

pub const DHCP_SERVER_PORT: u16 = 67;
pub const DHCP_CLIENT_PORT: u16 = 68;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    DnsServer = 6,
    Hostname = 12,
    DomainName = 15,
    InterfaceMtu = 26,
    BroadcastAddress = 28,
    RequestedIpAddress = 50,
    LeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    RenewalTime = 58,
    RebindingTime = 59,
    ClassIdentifier = 60,
    ClientIdentifier = 61,
    TftpServerName = 66,
    BootfileName = 67,
    ClientArchType = 93,
    Ipv6OnlyPreferred = 108,
    AutoConfigure = 116,
    DomainSearch = 119,
    ClasslessStaticRoute = 121,
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            3 => Ok(Self::Router),
            6 => Ok(Self::DnsServer),
            12 => Ok(Self::Hostname),
            15 => Ok(Self::DomainName),
            26 => Ok(Self::InterfaceMtu),
            28 => Ok(Self::BroadcastAddress),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            60 => Ok(Self::ClassIdentifier),
            61 => Ok(Self::ClientIdentifier),
            66 => Ok(Self::TftpServerName),
            67 => Ok(Self::BootfileName),
            93 => Ok(Self::ClientArchType),
            108 => Ok(Self::Ipv6OnlyPreferred),
            116 => Ok(Self::AutoConfigure),
            119 => Ok(Self::DomainSearch),
            121 => Ok(Self::ClasslessStaticRoute),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Discover),
            2 => Ok(Self::Offer),
            3 => Ok(Self::Request),
            4 => Ok(Self::Decline),
            5 => Ok(Self::Ack),
            6 => Ok(Self::Nak),
            7 => Ok(Self::Release),
            8 => Ok(Self::Inform),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discover => write!(f, "DISCOVER"),
            Self::Offer => write!(f, "OFFER"),
            Self::Request => write!(f, "REQUEST"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Ack => write!(f, "ACK"),
            Self::Nak => write!(f, "NAK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Inform => write!(f, "INFORM"),
        }
    }
}

/// A classless static route (RFC 3442): destination prefix plus gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticRoute {
    pub dest: ipnet::Ipv4Net,
    pub router: Ipv4Addr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    SubnetMask(Ipv4Addr),
    Router(Vec<Ipv4Addr>),
    DnsServer(Vec<Ipv4Addr>),
    Hostname(String),
    DomainName(String),
    InterfaceMtu(u16),
    BroadcastAddress(Ipv4Addr),
    RequestedIpAddress(Ipv4Addr),
    LeaseTime(u32),
    MessageType(MessageType),
    ServerIdentifier(Ipv4Addr),
    ParameterRequestList(Vec<u8>),
    RenewalTime(u32),
    RebindingTime(u32),
    ClassIdentifier(String),
    ClientIdentifier(Vec<u8>),
    TftpServerName(String),
    BootfileName(String),
    ClientArchType(Vec<u16>),
    /// RFC 8925 V6ONLY_WAIT, in seconds.
    Ipv6OnlyPreferred(u32),
    /// RFC 2563: 0 = DoNotAutoConfigure, 1 = AutoConfigure.
    AutoConfigure(u8),
    DomainSearch(Vec<String>),
    ClasslessStaticRoute(Vec<StaticRoute>),
    Unknown(u8, Vec<u8>),
}

impl DhcpOption {
    pub fn code(&self) -> u8 {
        match self {
            Self::SubnetMask(_) => OptionCode::SubnetMask as u8,
            Self::Router(_) => OptionCode::Router as u8,
            Self::DnsServer(_) => OptionCode::DnsServer as u8,
            Self::Hostname(_) => OptionCode::Hostname as u8,
            Self::DomainName(_) => OptionCode::DomainName as u8,
            Self::InterfaceMtu(_) => OptionCode::InterfaceMtu as u8,
            Self::BroadcastAddress(_) => OptionCode::BroadcastAddress as u8,
            Self::RequestedIpAddress(_) => OptionCode::RequestedIpAddress as u8,
            Self::LeaseTime(_) => OptionCode::LeaseTime as u8,
            Self::MessageType(_) => OptionCode::MessageType as u8,
            Self::ServerIdentifier(_) => OptionCode::ServerIdentifier as u8,
            Self::ParameterRequestList(_) => OptionCode::ParameterRequestList as u8,
            Self::RenewalTime(_) => OptionCode::RenewalTime as u8,
            Self::RebindingTime(_) => OptionCode::RebindingTime as u8,
            Self::ClassIdentifier(_) => OptionCode::ClassIdentifier as u8,
            Self::ClientIdentifier(_) => OptionCode::ClientIdentifier as u8,
            Self::TftpServerName(_) => OptionCode::TftpServerName as u8,
            Self::BootfileName(_) => OptionCode::BootfileName as u8,
            Self::ClientArchType(_) => OptionCode::ClientArchType as u8,
            Self::Ipv6OnlyPreferred(_) => OptionCode::Ipv6OnlyPreferred as u8,
            Self::AutoConfigure(_) => OptionCode::AutoConfigure as u8,
            Self::DomainSearch(_) => OptionCode::DomainSearch as u8,
            Self::ClasslessStaticRoute(_) => OptionCode::ClasslessStaticRoute as u8,
            Self::Unknown(code, _) => *code,
        }
    }

    pub fn parse(code: u8, data: &[u8]) -> Result<Self> {
        match OptionCode::try_from(code) {
            Ok(OptionCode::SubnetMask) => Ok(Self::SubnetMask(parse_ipv4(data, "subnet mask")?)),
            Ok(OptionCode::Router) => Ok(Self::Router(parse_ipv4_list(data, "router")?)),
            Ok(OptionCode::DnsServer) => Ok(Self::DnsServer(parse_ipv4_list(data, "DNS server")?)),
            Ok(OptionCode::Hostname) => {
                Ok(Self::Hostname(String::from_utf8_lossy(data).to_string()))
            }
            Ok(OptionCode::DomainName) => {
                Ok(Self::DomainName(String::from_utf8_lossy(data).to_string()))
            }
            Ok(OptionCode::InterfaceMtu) => {
                if data.len() != 2 {
                    return Err(Error::InvalidPacket("Invalid MTU length".to_string()));
                }
                Ok(Self::InterfaceMtu(u16::from_be_bytes([data[0], data[1]])))
            }
            Ok(OptionCode::BroadcastAddress) => {
                Ok(Self::BroadcastAddress(parse_ipv4(data, "broadcast address")?))
            }
            Ok(OptionCode::RequestedIpAddress) => {
                Ok(Self::RequestedIpAddress(parse_ipv4(data, "requested IP")?))
            }
            Ok(OptionCode::LeaseTime) => Ok(Self::LeaseTime(parse_u32(data, "lease time")?)),
            Ok(OptionCode::MessageType) => {
                if data.len() != 1 {
                    return Err(Error::InvalidPacket(
                        "Invalid message type length".to_string(),
                    ));
                }
                let msg_type = MessageType::try_from(data[0]).map_err(|value| {
                    Error::InvalidPacket(format!("Unknown message type: {}", value))
                })?;
                Ok(Self::MessageType(msg_type))
            }
            Ok(OptionCode::ServerIdentifier) => {
                Ok(Self::ServerIdentifier(parse_ipv4(data, "server identifier")?))
            }
            Ok(OptionCode::ParameterRequestList) => Ok(Self::ParameterRequestList(data.to_vec())),
            Ok(OptionCode::RenewalTime) => Ok(Self::RenewalTime(parse_u32(data, "renewal time")?)),
            Ok(OptionCode::RebindingTime) => {
                Ok(Self::RebindingTime(parse_u32(data, "rebinding time")?))
            }
            Ok(OptionCode::ClassIdentifier) => Ok(Self::ClassIdentifier(
                String::from_utf8_lossy(data).to_string(),
            )),
            Ok(OptionCode::ClientIdentifier) => Ok(Self::ClientIdentifier(data.to_vec())),
            Ok(OptionCode::TftpServerName) => Ok(Self::TftpServerName(
                String::from_utf8_lossy(data).to_string(),
            )),
            Ok(OptionCode::BootfileName) => Ok(Self::BootfileName(
                String::from_utf8_lossy(data).to_string(),
            )),
            Ok(OptionCode::ClientArchType) => {
                if data.len() % 2 != 0 || data.is_empty() {
                    return Err(Error::InvalidPacket(
                        "Invalid client arch type length".to_string(),
                    ));
                }
                let types = data
                    .chunks_exact(2)
                    .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                    .collect();
                Ok(Self::ClientArchType(types))
            }
            Ok(OptionCode::Ipv6OnlyPreferred) => {
                Ok(Self::Ipv6OnlyPreferred(parse_u32(data, "v6-only wait")?))
            }
            Ok(OptionCode::AutoConfigure) => {
                if data.len() != 1 {
                    return Err(Error::InvalidPacket(
                        "Invalid auto-configure length".to_string(),
                    ));
                }
                Ok(Self::AutoConfigure(data[0]))
            }
            Ok(OptionCode::DomainSearch) => Ok(Self::DomainSearch(parse_domain_list(data)?)),
            Ok(OptionCode::ClasslessStaticRoute) => {
                Ok(Self::ClasslessStaticRoute(parse_routes(data)?))
            }
            Ok(OptionCode::Pad) | Ok(OptionCode::End) => Err(Error::InvalidPacket(
                "Pad/End should not be parsed as options".to_string(),
            )),
            Err(unknown_code) => Ok(Self::Unknown(unknown_code, data.to_vec())),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let mut result = vec![self.code(), payload.len() as u8];
        result.extend_from_slice(&payload);
        result
    }

    fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::SubnetMask(addr)
            | Self::BroadcastAddress(addr)
            | Self::RequestedIpAddress(addr)
            | Self::ServerIdentifier(addr) => addr.octets().to_vec(),
            Self::Router(addrs) | Self::DnsServer(addrs) => {
                addrs.iter().flat_map(|addr| addr.octets()).collect()
            }
            Self::Hostname(text)
            | Self::DomainName(text)
            | Self::ClassIdentifier(text)
            | Self::TftpServerName(text)
            | Self::BootfileName(text) => text.as_bytes().to_vec(),
            Self::InterfaceMtu(mtu) => mtu.to_be_bytes().to_vec(),
            Self::LeaseTime(value)
            | Self::RenewalTime(value)
            | Self::RebindingTime(value)
            | Self::Ipv6OnlyPreferred(value) => value.to_be_bytes().to_vec(),
            Self::MessageType(msg_type) => vec![*msg_type as u8],
            Self::ParameterRequestList(params) => params.clone(),
            Self::ClientIdentifier(data) => data.clone(),
            Self::ClientArchType(types) => {
                types.iter().flat_map(|value| value.to_be_bytes()).collect()
            }
            Self::AutoConfigure(value) => vec![*value],
            Self::DomainSearch(domains) => encode_domain_list(domains),
            Self::ClasslessStaticRoute(routes) => encode_routes(routes),
            Self::Unknown(_, data) => data.clone(),
        }
    }
}

fn parse_ipv4(data: &[u8], what: &str) -> Result<Ipv4Addr> {
    if data.len() != 4 {
        return Err(Error::InvalidPacket(format!("Invalid {} length", what)));
    }
    Ok(Ipv4Addr::new(data[0], data[1], data[2], data[3]))
}

fn parse_ipv4_list(data: &[u8], what: &str) -> Result<Vec<Ipv4Addr>> {
    if data.len() % 4 != 0 || data.is_empty() {
        return Err(Error::InvalidPacket(format!(
            "Invalid {} option length",
            what
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
        .collect())
}

fn parse_u32(data: &[u8], what: &str) -> Result<u32> {
    if data.len() != 4 {
        return Err(Error::InvalidPacket(format!("Invalid {} length", what)));
    }
    Ok(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
}

/// Decodes an RFC 1035 domain list. Compression pointers are rejected; the
/// server never emits them and parsing arbitrary pointer targets safely
/// would require the whole-message context this option does not have.
pub(crate) fn parse_domain_list(data: &[u8]) -> Result<Vec<String>> {
    let mut domains = Vec::new();
    let mut index = 0;
    let mut labels: Vec<String> = Vec::new();
    while index < data.len() {
        let len = data[index] as usize;
        index += 1;
        if len == 0 {
            if !labels.is_empty() {
                domains.push(labels.join("."));
                labels.clear();
            }
            continue;
        }
        if len >= 0xc0 {
            return Err(Error::InvalidPacket(
                "Compressed domain labels are not supported".to_string(),
            ));
        }
        if index + len > data.len() {
            return Err(Error::InvalidPacket("Domain label truncated".to_string()));
        }
        labels.push(String::from_utf8_lossy(&data[index..index + len]).to_string());
        index += len;
    }
    if !labels.is_empty() {
        return Err(Error::InvalidPacket(
            "Domain list missing terminator".to_string(),
        ));
    }
    Ok(domains)
}

pub(crate) fn encode_domain_list(domains: &[String]) -> Vec<u8> {
    let mut result = Vec::new();
    for domain in domains {
        for label in domain.split('.').filter(|label| !label.is_empty()) {
            result.push(label.len() as u8);
            result.extend_from_slice(label.as_bytes());
        }
        result.push(0);
    }
    result
}

fn parse_routes(data: &[u8]) -> Result<Vec<StaticRoute>> {
    let mut routes = Vec::new();
    let mut index = 0;
    while index < data.len() {
        let prefix_len = data[index];
        if prefix_len > 32 {
            return Err(Error::InvalidPacket("Invalid route prefix length".to_string()));
        }
        index += 1;
        let dest_octets = (prefix_len as usize + 7) / 8;
        if index + dest_octets + 4 > data.len() {
            return Err(Error::InvalidPacket("Route descriptor truncated".to_string()));
        }
        let mut dest = [0u8; 4];
        dest[..dest_octets].copy_from_slice(&data[index..index + dest_octets]);
        index += dest_octets;
        let router = Ipv4Addr::new(data[index], data[index + 1], data[index + 2], data[index + 3]);
        index += 4;
        let dest = ipnet::Ipv4Net::new(Ipv4Addr::from(dest), prefix_len)
            .map_err(|error| Error::InvalidPacket(format!("Invalid route prefix: {}", error)))?;
        routes.push(StaticRoute { dest, router });
    }
    Ok(routes)
}

fn encode_routes(routes: &[StaticRoute]) -> Vec<u8> {
    let mut result = Vec::new();
    for route in routes {
        let prefix_len = route.dest.prefix_len();
        result.push(prefix_len);
        let dest_octets = (prefix_len as usize + 7) / 8;
        result.extend_from_slice(&route.dest.network().octets()[..dest_octets]);
        result.extend_from_slice(&route.router.octets());
    }
    result
}

#[derive(Debug, Clone)]
pub struct Dhcpv4Packet {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: [u8; 16],
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<DhcpOption>,
}

impl Dhcpv4Packet {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 240 {
            return Err(Error::InvalidPacket(format!(
                "Packet too short: {} bytes (minimum 240)",
                data.len()
            )));
        }

        let magic_cookie = &data[236..240];
        if magic_cookie != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidPacket("Invalid magic cookie".to_string()));
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let mut chaddr = [0u8; 16];
        chaddr.copy_from_slice(&data[28..44]);

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = Self::parse_options(&data[240..])?;

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::InvalidPacket("Option length missing".to_string()));
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::InvalidPacket("Option data truncated".to_string()));
            }

            let option_data = &data[index + 2..index + 2 + length];
            let option = DhcpOption::parse(code, option_data)?;
            options.push(option);

            index += 2 + length;
        }

        Ok(options)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packet = Vec::with_capacity(576);

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.hlen);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        packet.extend_from_slice(&self.chaddr);
        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            packet.extend_from_slice(&option.encode());
        }

        packet.push(OptionCode::End as u8);

        while packet.len() < 300 {
            packet.push(0);
        }

        packet
    }

    /// Builds a reply skeleton from a request: xid, flags, client hardware
    /// address and relay address are carried over, everything else is fresh.
    /// The message type is set afterwards by the dispatcher.
    pub fn create_reply(request: &Dhcpv4Packet) -> Self {
        Self {
            op: BOOTREPLY,
            htype: HTYPE_ETHERNET,
            hlen: HLEN_ETHERNET,
            hops: 0,
            xid: request.xid,
            secs: 0,
            flags: request.flags,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: request.giaddr,
            chaddr: request.chaddr,
            sname: [0u8; 64],
            file: [0u8; 128],
            options: Vec::new(),
        }
    }

    /// Replaces an existing option with the same code, or appends. Later
    /// writers win, which gives the handler chain its override semantics.
    pub fn update_option(&mut self, option: DhcpOption) {
        if let Some(existing) = self
            .options
            .iter_mut()
            .find(|existing| existing.code() == option.code())
        {
            *existing = option;
        } else {
            self.options.push(option);
        }
    }

    pub fn get_option(&self, code: OptionCode) -> Option<&DhcpOption> {
        self.options.iter().find(|option| option.code() == code as u8)
    }

    /// True if the client listed `code` in its parameter request list.
    pub fn is_option_requested(&self, code: OptionCode) -> bool {
        match self.get_option(OptionCode::ParameterRequestList) {
            Some(DhcpOption::ParameterRequestList(params)) => params.contains(&(code as u8)),
            _ => false,
        }
    }

    pub fn message_type(&self) -> Option<MessageType> {
        match self.get_option(OptionCode::MessageType) {
            Some(DhcpOption::MessageType(msg_type)) => Some(*msg_type),
            _ => None,
        }
    }

    pub fn requested_ip(&self) -> Option<Ipv4Addr> {
        match self.get_option(OptionCode::RequestedIpAddress) {
            Some(DhcpOption::RequestedIpAddress(ip)) => Some(*ip),
            _ => None,
        }
    }

    pub fn server_identifier(&self) -> Option<Ipv4Addr> {
        match self.get_option(OptionCode::ServerIdentifier) {
            Some(DhcpOption::ServerIdentifier(ip)) => Some(*ip),
            _ => None,
        }
    }

    pub fn hostname(&self) -> Option<&str> {
        match self.get_option(OptionCode::Hostname) {
            Some(DhcpOption::Hostname(name)) => Some(name),
            _ => None,
        }
    }

    pub fn class_identifier(&self) -> Option<&str> {
        match self.get_option(OptionCode::ClassIdentifier) {
            Some(DhcpOption::ClassIdentifier(id)) => Some(id),
            _ => None,
        }
    }

    pub fn client_arch_types(&self) -> Option<&[u16]> {
        match self.get_option(OptionCode::ClientArchType) {
            Some(DhcpOption::ClientArchType(types)) => Some(types),
            _ => None,
        }
    }

    pub fn auto_configure(&self) -> Option<u8> {
        match self.get_option(OptionCode::AutoConfigure) {
            Some(DhcpOption::AutoConfigure(value)) => Some(*value),
            _ => None,
        }
    }

    /// Client hardware address as lowercase colon-separated text.
    pub fn mac_address(&self) -> String {
        self.chaddr[..6]
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn is_broadcast(&self) -> bool {
        (self.flags & 0x8000) != 0
    }

    /// One-line summary for debug logging.
    pub fn summary(&self) -> String {
        format!(
            "{} xid=0x{:08x} mac={} yiaddr={} options={}",
            self.message_type()
                .map(|msg_type| msg_type.to_string())
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            self.xid,
            self.mac_address(),
            self.yiaddr,
            self.options.len(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_discover_packet() -> Vec<u8> {
        let mut packet = vec![0u8; 300];

        packet[0] = BOOTREQUEST;
        packet[1] = HTYPE_ETHERNET;
        packet[2] = HLEN_ETHERNET;
        packet[3] = 0;

        packet[4..8].copy_from_slice(&0x12345678u32.to_be_bytes());
        packet[8..10].copy_from_slice(&0u16.to_be_bytes());
        packet[10..12].copy_from_slice(&0x8000u16.to_be_bytes());

        packet[28..34].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

        packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);

        packet[240] = OptionCode::MessageType as u8;
        packet[241] = 1;
        packet[242] = MessageType::Discover as u8;

        packet[243] = OptionCode::End as u8;

        packet
    }

    #[test]
    fn test_parse_discover_packet() {
        let data = create_test_discover_packet();
        let packet = Dhcpv4Packet::parse(&data).unwrap();

        assert_eq!(packet.op, BOOTREQUEST);
        assert_eq!(packet.htype, HTYPE_ETHERNET);
        assert_eq!(packet.hlen, HLEN_ETHERNET);
        assert_eq!(packet.xid, 0x12345678);
        assert!(packet.is_broadcast());
        assert_eq!(packet.message_type(), Some(MessageType::Discover));
        assert_eq!(packet.mac_address(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_packet_roundtrip() {
        let original_data = create_test_discover_packet();
        let packet = Dhcpv4Packet::parse(&original_data).unwrap();
        let encoded = packet.encode();

        let reparsed = Dhcpv4Packet::parse(&encoded).unwrap();
        assert_eq!(reparsed.op, packet.op);
        assert_eq!(reparsed.xid, packet.xid);
        assert_eq!(reparsed.mac_address(), packet.mac_address());
        assert_eq!(reparsed.message_type(), packet.message_type());
    }

    #[test]
    fn test_create_reply() {
        let discover_data = create_test_discover_packet();
        let discover = Dhcpv4Packet::parse(&discover_data).unwrap();

        let mut offer = Dhcpv4Packet::create_reply(&discover);
        offer.update_option(DhcpOption::MessageType(MessageType::Offer));
        offer.yiaddr = Ipv4Addr::new(192, 168, 1, 100);

        assert_eq!(offer.op, BOOTREPLY);
        assert_eq!(offer.xid, discover.xid);
        assert_eq!(offer.flags, discover.flags);
        assert_eq!(offer.chaddr, discover.chaddr);
        assert_eq!(offer.message_type(), Some(MessageType::Offer));
    }

    #[test]
    fn test_update_option_replaces() {
        let discover = Dhcpv4Packet::parse(&create_test_discover_packet()).unwrap();
        let mut reply = Dhcpv4Packet::create_reply(&discover);

        reply.update_option(DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 0, 0)));
        reply.update_option(DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)));

        let masks: Vec<_> = reply
            .options
            .iter()
            .filter(|option| option.code() == OptionCode::SubnetMask as u8)
            .collect();
        assert_eq!(masks.len(), 1);
        assert_eq!(
            reply.get_option(OptionCode::SubnetMask),
            Some(&DhcpOption::SubnetMask(Ipv4Addr::new(255, 255, 255, 0)))
        );
    }

    #[test]
    fn test_is_option_requested() {
        let mut data = create_test_discover_packet();
        data[243] = OptionCode::ParameterRequestList as u8;
        data[244] = 2;
        data[245] = OptionCode::SubnetMask as u8;
        data[246] = OptionCode::InterfaceMtu as u8;
        data[247] = OptionCode::End as u8;

        let packet = Dhcpv4Packet::parse(&data).unwrap();
        assert!(packet.is_option_requested(OptionCode::SubnetMask));
        assert!(packet.is_option_requested(OptionCode::InterfaceMtu));
        assert!(!packet.is_option_requested(OptionCode::Router));
    }

    #[test]
    fn test_domain_search_roundtrip() {
        let domains = vec!["example.local".to_string(), "corp.example".to_string()];
        let option = DhcpOption::DomainSearch(domains.clone());
        let encoded = option.encode();

        let decoded = DhcpOption::parse(OptionCode::DomainSearch as u8, &encoded[2..]).unwrap();
        assert_eq!(decoded, DhcpOption::DomainSearch(domains));
    }

    #[test]
    fn test_static_route_roundtrip() {
        let routes = vec![
            StaticRoute {
                dest: "10.0.0.0/8".parse().unwrap(),
                router: Ipv4Addr::new(192, 168, 1, 1),
            },
            StaticRoute {
                dest: "172.16.0.0/12".parse().unwrap(),
                router: Ipv4Addr::new(192, 168, 1, 254),
            },
        ];
        let option = DhcpOption::ClasslessStaticRoute(routes.clone());
        let encoded = option.encode();

        let decoded =
            DhcpOption::parse(OptionCode::ClasslessStaticRoute as u8, &encoded[2..]).unwrap();
        assert_eq!(decoded, DhcpOption::ClasslessStaticRoute(routes));
    }

    #[test]
    fn test_packet_too_short() {
        let data = vec![0u8; 100];
        assert!(Dhcpv4Packet::parse(&data).is_err());
    }

    #[test]
    fn test_invalid_magic_cookie() {
        let mut data = vec![0u8; 300];
        data[236..240].copy_from_slice(&[0, 0, 0, 0]);
        assert!(Dhcpv4Packet::parse(&data).is_err());
    }
}

use std::net::Ipv6Addr;

use crate::error::{Error, Result};
use crate::v4::{encode_domain_list, parse_domain_list};

pub const DHCP_SERVER_PORT: u16 = 547;
pub const DHCP_CLIENT_PORT: u16 = 546;

/// All-DHCP-relay-agents-and-servers (link scope).
pub const MULTICAST_RELAY_AGENTS_AND_SERVERS: Ipv6Addr =
    Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 0x1, 0x2);
/// All-DHCP-servers (site scope).
pub const MULTICAST_ALL_SERVERS: Ipv6Addr = Ipv6Addr::new(0xff05, 0, 0, 0, 0, 0, 0x1, 0x3);

/// Nested relay-forward chains deeper than this are rejected (RFC 8415 §19).
const MAX_RELAY_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    Solicit = 1,
    Advertise = 2,
    Request = 3,
    Confirm = 4,
    Renew = 5,
    Rebind = 6,
    Reply = 7,
    Release = 8,
    Decline = 9,
    Reconfigure = 10,
    InformationRequest = 11,
    RelayForw = 12,
    RelayRepl = 13,
}

impl TryFrom<u8> for MessageType {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Solicit),
            2 => Ok(Self::Advertise),
            3 => Ok(Self::Request),
            4 => Ok(Self::Confirm),
            5 => Ok(Self::Renew),
            6 => Ok(Self::Rebind),
            7 => Ok(Self::Reply),
            8 => Ok(Self::Release),
            9 => Ok(Self::Decline),
            10 => Ok(Self::Reconfigure),
            11 => Ok(Self::InformationRequest),
            12 => Ok(Self::RelayForw),
            13 => Ok(Self::RelayRepl),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Solicit => write!(f, "SOLICIT"),
            Self::Advertise => write!(f, "ADVERTISE"),
            Self::Request => write!(f, "REQUEST"),
            Self::Confirm => write!(f, "CONFIRM"),
            Self::Renew => write!(f, "RENEW"),
            Self::Rebind => write!(f, "REBIND"),
            Self::Reply => write!(f, "REPLY"),
            Self::Release => write!(f, "RELEASE"),
            Self::Decline => write!(f, "DECLINE"),
            Self::Reconfigure => write!(f, "RECONFIGURE"),
            Self::InformationRequest => write!(f, "INFORMATION-REQUEST"),
            Self::RelayForw => write!(f, "RELAY-FORW"),
            Self::RelayRepl => write!(f, "RELAY-REPL"),
        }
    }
}

pub mod option_code {
    pub const CLIENT_ID: u16 = 1;
    pub const SERVER_ID: u16 = 2;
    pub const IA_NA: u16 = 3;
    pub const IA_ADDRESS: u16 = 5;
    pub const ORO: u16 = 6;
    pub const ELAPSED_TIME: u16 = 8;
    pub const RELAY_MSG: u16 = 9;
    pub const STATUS_CODE: u16 = 13;
    pub const RAPID_COMMIT: u16 = 14;
    pub const VENDOR_CLASS: u16 = 16;
    pub const INTERFACE_ID: u16 = 18;
    pub const DNS_SERVERS: u16 = 23;
    pub const DOMAIN_SEARCH_LIST: u16 = 24;
    pub const IA_PD: u16 = 25;
    pub const IA_PREFIX: u16 = 26;
    pub const BOOTFILE_URL: u16 = 59;
    pub const BOOTFILE_PARAM: u16 = 60;
    pub const CLIENT_ARCH_TYPE: u16 = 61;
}

/// DHCPv6 status codes (RFC 8415 §21.13).
pub mod status {
    pub const SUCCESS: u16 = 0;
    pub const UNSPEC_FAIL: u16 = 1;
    pub const NO_ADDRS_AVAIL: u16 = 2;
    pub const NO_BINDING: u16 = 3;
    pub const NOT_ON_LINK: u16 = 4;
    pub const USE_MULTICAST: u16 = 5;
    pub const NO_PREFIX_AVAIL: u16 = 6;
}

/// A DHCP Unique Identifier (RFC 8415 §11).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Duid {
    LinkLayerTime {
        hw_type: u16,
        time: u32,
        addr: Vec<u8>,
    },
    LinkLayer {
        hw_type: u16,
        addr: Vec<u8>,
    },
    Uuid(uuid::Uuid),
    Opaque(Vec<u8>),
}

impl Duid {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::LinkLayerTime { hw_type, time, addr } => {
                let mut bytes = vec![0, 1];
                bytes.extend_from_slice(&hw_type.to_be_bytes());
                bytes.extend_from_slice(&time.to_be_bytes());
                bytes.extend_from_slice(addr);
                bytes
            }
            Self::LinkLayer { hw_type, addr } => {
                let mut bytes = vec![0, 3];
                bytes.extend_from_slice(&hw_type.to_be_bytes());
                bytes.extend_from_slice(addr);
                bytes
            }
            Self::Uuid(id) => {
                let mut bytes = vec![0, 4];
                bytes.extend_from_slice(id.as_bytes());
                bytes
            }
            Self::Opaque(bytes) => bytes.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaNa {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub options: Vec<DhcpOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaAddress {
    pub addr: Ipv6Addr,
    pub preferred: u32,
    pub valid: u32,
    pub options: Vec<DhcpOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaPd {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub options: Vec<DhcpOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IaPrefix {
    pub preferred: u32,
    pub valid: u32,
    pub prefix_len: u8,
    pub prefix: Ipv6Addr,
    pub options: Vec<DhcpOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusCode {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VendorClass {
    pub enterprise: u32,
    pub data: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhcpOption {
    ClientId(Vec<u8>),
    ServerId(Vec<u8>),
    IaNa(IaNa),
    IaAddress(IaAddress),
    Oro(Vec<u16>),
    ElapsedTime(u16),
    RelayMsg(Vec<u8>),
    StatusCode(StatusCode),
    RapidCommit,
    VendorClass(VendorClass),
    InterfaceId(Vec<u8>),
    DnsServers(Vec<Ipv6Addr>),
    DomainSearchList(Vec<String>),
    IaPd(IaPd),
    IaPrefix(IaPrefix),
    BootfileUrl(String),
    BootfileParam(Vec<String>),
    ClientArchType(Vec<u16>),
    Unknown(u16, Vec<u8>),
}

impl DhcpOption {
    pub fn code(&self) -> u16 {
        match self {
            Self::ClientId(_) => option_code::CLIENT_ID,
            Self::ServerId(_) => option_code::SERVER_ID,
            Self::IaNa(_) => option_code::IA_NA,
            Self::IaAddress(_) => option_code::IA_ADDRESS,
            Self::Oro(_) => option_code::ORO,
            Self::ElapsedTime(_) => option_code::ELAPSED_TIME,
            Self::RelayMsg(_) => option_code::RELAY_MSG,
            Self::StatusCode(_) => option_code::STATUS_CODE,
            Self::RapidCommit => option_code::RAPID_COMMIT,
            Self::VendorClass(_) => option_code::VENDOR_CLASS,
            Self::InterfaceId(_) => option_code::INTERFACE_ID,
            Self::DnsServers(_) => option_code::DNS_SERVERS,
            Self::DomainSearchList(_) => option_code::DOMAIN_SEARCH_LIST,
            Self::IaPd(_) => option_code::IA_PD,
            Self::IaPrefix(_) => option_code::IA_PREFIX,
            Self::BootfileUrl(_) => option_code::BOOTFILE_URL,
            Self::BootfileParam(_) => option_code::BOOTFILE_PARAM,
            Self::ClientArchType(_) => option_code::CLIENT_ARCH_TYPE,
            Self::Unknown(code, _) => *code,
        }
    }

    fn parse(code: u16, data: &[u8]) -> Result<Self> {
        match code {
            option_code::CLIENT_ID => Ok(Self::ClientId(data.to_vec())),
            option_code::SERVER_ID => Ok(Self::ServerId(data.to_vec())),
            option_code::IA_NA => {
                if data.len() < 12 {
                    return Err(Error::InvalidPacket("IA_NA too short".to_string()));
                }
                Ok(Self::IaNa(IaNa {
                    iaid: be_u32(&data[0..4]),
                    t1: be_u32(&data[4..8]),
                    t2: be_u32(&data[8..12]),
                    options: parse_options(&data[12..])?,
                }))
            }
            option_code::IA_ADDRESS => {
                if data.len() < 24 {
                    return Err(Error::InvalidPacket("IA address too short".to_string()));
                }
                let mut addr = [0u8; 16];
                addr.copy_from_slice(&data[0..16]);
                Ok(Self::IaAddress(IaAddress {
                    addr: Ipv6Addr::from(addr),
                    preferred: be_u32(&data[16..20]),
                    valid: be_u32(&data[20..24]),
                    options: parse_options(&data[24..])?,
                }))
            }
            option_code::ORO => {
                if data.len() % 2 != 0 {
                    return Err(Error::InvalidPacket("Invalid ORO length".to_string()));
                }
                Ok(Self::Oro(
                    data.chunks_exact(2)
                        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                        .collect(),
                ))
            }
            option_code::ELAPSED_TIME => {
                if data.len() != 2 {
                    return Err(Error::InvalidPacket(
                        "Invalid elapsed time length".to_string(),
                    ));
                }
                Ok(Self::ElapsedTime(u16::from_be_bytes([data[0], data[1]])))
            }
            option_code::RELAY_MSG => Ok(Self::RelayMsg(data.to_vec())),
            option_code::STATUS_CODE => {
                if data.len() < 2 {
                    return Err(Error::InvalidPacket("Status code too short".to_string()));
                }
                Ok(Self::StatusCode(StatusCode {
                    code: u16::from_be_bytes([data[0], data[1]]),
                    message: String::from_utf8_lossy(&data[2..]).to_string(),
                }))
            }
            option_code::RAPID_COMMIT => {
                if !data.is_empty() {
                    return Err(Error::InvalidPacket(
                        "Rapid commit carries no payload".to_string(),
                    ));
                }
                Ok(Self::RapidCommit)
            }
            option_code::VENDOR_CLASS => {
                if data.len() < 4 {
                    return Err(Error::InvalidPacket("Vendor class too short".to_string()));
                }
                let enterprise = be_u32(&data[0..4]);
                let mut items = Vec::new();
                let mut index = 4;
                while index < data.len() {
                    if index + 2 > data.len() {
                        return Err(Error::InvalidPacket(
                            "Vendor class item truncated".to_string(),
                        ));
                    }
                    let len = u16::from_be_bytes([data[index], data[index + 1]]) as usize;
                    index += 2;
                    if index + len > data.len() {
                        return Err(Error::InvalidPacket(
                            "Vendor class item truncated".to_string(),
                        ));
                    }
                    items.push(data[index..index + len].to_vec());
                    index += len;
                }
                Ok(Self::VendorClass(VendorClass {
                    enterprise,
                    data: items,
                }))
            }
            option_code::INTERFACE_ID => Ok(Self::InterfaceId(data.to_vec())),
            option_code::DNS_SERVERS => {
                if data.len() % 16 != 0 {
                    return Err(Error::InvalidPacket(
                        "Invalid DNS servers length".to_string(),
                    ));
                }
                Ok(Self::DnsServers(
                    data.chunks_exact(16)
                        .map(|chunk| {
                            let mut octets = [0u8; 16];
                            octets.copy_from_slice(chunk);
                            Ipv6Addr::from(octets)
                        })
                        .collect(),
                ))
            }
            option_code::DOMAIN_SEARCH_LIST => Ok(Self::DomainSearchList(parse_domain_list(data)?)),
            option_code::IA_PD => {
                if data.len() < 12 {
                    return Err(Error::InvalidPacket("IA_PD too short".to_string()));
                }
                Ok(Self::IaPd(IaPd {
                    iaid: be_u32(&data[0..4]),
                    t1: be_u32(&data[4..8]),
                    t2: be_u32(&data[8..12]),
                    options: parse_options(&data[12..])?,
                }))
            }
            option_code::IA_PREFIX => {
                if data.len() < 25 {
                    return Err(Error::InvalidPacket("IA prefix too short".to_string()));
                }
                let mut prefix = [0u8; 16];
                prefix.copy_from_slice(&data[9..25]);
                Ok(Self::IaPrefix(IaPrefix {
                    preferred: be_u32(&data[0..4]),
                    valid: be_u32(&data[4..8]),
                    prefix_len: data[8],
                    prefix: Ipv6Addr::from(prefix),
                    options: parse_options(&data[25..])?,
                }))
            }
            option_code::BOOTFILE_URL => Ok(Self::BootfileUrl(
                String::from_utf8_lossy(data).to_string(),
            )),
            option_code::BOOTFILE_PARAM => {
                let mut params = Vec::new();
                let mut index = 0;
                while index < data.len() {
                    if index + 2 > data.len() {
                        return Err(Error::InvalidPacket(
                            "Bootfile param truncated".to_string(),
                        ));
                    }
                    let len = u16::from_be_bytes([data[index], data[index + 1]]) as usize;
                    index += 2;
                    if index + len > data.len() {
                        return Err(Error::InvalidPacket(
                            "Bootfile param truncated".to_string(),
                        ));
                    }
                    params.push(String::from_utf8_lossy(&data[index..index + len]).to_string());
                    index += len;
                }
                Ok(Self::BootfileParam(params))
            }
            option_code::CLIENT_ARCH_TYPE => {
                if data.len() % 2 != 0 || data.is_empty() {
                    return Err(Error::InvalidPacket(
                        "Invalid client arch type length".to_string(),
                    ));
                }
                Ok(Self::ClientArchType(
                    data.chunks_exact(2)
                        .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
                        .collect(),
                ))
            }
            other => Ok(Self::Unknown(other, data.to_vec())),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let payload = self.encode_payload();
        let mut result = Vec::with_capacity(4 + payload.len());
        result.extend_from_slice(&self.code().to_be_bytes());
        result.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        result.extend_from_slice(&payload);
        result
    }

    fn encode_payload(&self) -> Vec<u8> {
        match self {
            Self::ClientId(bytes) | Self::ServerId(bytes) | Self::RelayMsg(bytes)
            | Self::InterfaceId(bytes) => bytes.clone(),
            Self::IaNa(ia) => {
                let mut payload = Vec::new();
                payload.extend_from_slice(&ia.iaid.to_be_bytes());
                payload.extend_from_slice(&ia.t1.to_be_bytes());
                payload.extend_from_slice(&ia.t2.to_be_bytes());
                encode_options_into(&ia.options, &mut payload);
                payload
            }
            Self::IaAddress(addr) => {
                let mut payload = Vec::new();
                payload.extend_from_slice(&addr.addr.octets());
                payload.extend_from_slice(&addr.preferred.to_be_bytes());
                payload.extend_from_slice(&addr.valid.to_be_bytes());
                encode_options_into(&addr.options, &mut payload);
                payload
            }
            Self::Oro(codes) => codes.iter().flat_map(|code| code.to_be_bytes()).collect(),
            Self::ElapsedTime(time) => time.to_be_bytes().to_vec(),
            Self::StatusCode(status) => {
                let mut payload = status.code.to_be_bytes().to_vec();
                payload.extend_from_slice(status.message.as_bytes());
                payload
            }
            Self::RapidCommit => Vec::new(),
            Self::VendorClass(class) => {
                let mut payload = class.enterprise.to_be_bytes().to_vec();
                for item in &class.data {
                    payload.extend_from_slice(&(item.len() as u16).to_be_bytes());
                    payload.extend_from_slice(item);
                }
                payload
            }
            Self::DnsServers(servers) => {
                servers.iter().flat_map(|server| server.octets()).collect()
            }
            Self::DomainSearchList(domains) => encode_domain_list(domains),
            Self::IaPd(ia) => {
                let mut payload = Vec::new();
                payload.extend_from_slice(&ia.iaid.to_be_bytes());
                payload.extend_from_slice(&ia.t1.to_be_bytes());
                payload.extend_from_slice(&ia.t2.to_be_bytes());
                encode_options_into(&ia.options, &mut payload);
                payload
            }
            Self::IaPrefix(prefix) => {
                let mut payload = Vec::new();
                payload.extend_from_slice(&prefix.preferred.to_be_bytes());
                payload.extend_from_slice(&prefix.valid.to_be_bytes());
                payload.push(prefix.prefix_len);
                payload.extend_from_slice(&prefix.prefix.octets());
                encode_options_into(&prefix.options, &mut payload);
                payload
            }
            Self::BootfileUrl(url) => url.as_bytes().to_vec(),
            Self::BootfileParam(params) => {
                let mut payload = Vec::new();
                for param in params {
                    payload.extend_from_slice(&(param.len() as u16).to_be_bytes());
                    payload.extend_from_slice(param.as_bytes());
                }
                payload
            }
            Self::ClientArchType(types) => {
                types.iter().flat_map(|value| value.to_be_bytes()).collect()
            }
            Self::Unknown(_, data) => data.clone(),
        }
    }
}

fn be_u32(data: &[u8]) -> u32 {
    u32::from_be_bytes([data[0], data[1], data[2], data[3]])
}

fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
    let mut options = Vec::new();
    let mut index = 0;
    while index < data.len() {
        if index + 4 > data.len() {
            return Err(Error::InvalidPacket("Option header truncated".to_string()));
        }
        let code = u16::from_be_bytes([data[index], data[index + 1]]);
        let length = u16::from_be_bytes([data[index + 2], data[index + 3]]) as usize;
        index += 4;
        if index + length > data.len() {
            return Err(Error::InvalidPacket("Option data truncated".to_string()));
        }
        options.push(DhcpOption::parse(code, &data[index..index + length])?);
        index += length;
    }
    Ok(options)
}

fn encode_options_into(options: &[DhcpOption], out: &mut Vec<u8>) {
    for option in options {
        out.extend_from_slice(&option.encode());
    }
}

/// A plain (non-relay) DHCPv6 message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dhcpv6Message {
    pub msg_type: MessageType,
    pub xid: [u8; 3],
    pub options: Vec<DhcpOption>,
}

impl Dhcpv6Message {
    pub fn new(msg_type: MessageType) -> Self {
        Self {
            msg_type,
            xid: [0; 3],
            options: Vec::new(),
        }
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::InvalidPacket("Message too short".to_string()));
        }
        let msg_type = MessageType::try_from(data[0])
            .map_err(|value| Error::InvalidPacket(format!("Unknown message type: {}", value)))?;
        if msg_type == MessageType::RelayForw || msg_type == MessageType::RelayRepl {
            return Err(Error::InvalidPacket(
                "Relay message where plain message expected".to_string(),
            ));
        }
        Ok(Self {
            msg_type,
            xid: [data[1], data[2], data[3]],
            options: parse_options(&data[4..])?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packet = vec![self.msg_type as u8];
        packet.extend_from_slice(&self.xid);
        encode_options_into(&self.options, &mut packet);
        packet
    }

    /// Builds a reply skeleton keyed to `request`: same transaction id, the
    /// client identifier echoed, nothing else. The message type is whatever
    /// the dispatcher decided (`Reply`, or `Advertise` for a plain Solicit).
    pub fn reply_to(msg_type: MessageType, request: &Dhcpv6Message) -> Self {
        let mut reply = Self::new(msg_type);
        reply.xid = request.xid;
        if let Some(client_id) = request.client_id() {
            reply.options.push(DhcpOption::ClientId(client_id.to_vec()));
        }
        reply
    }

    pub fn add_option(&mut self, option: DhcpOption) {
        self.options.push(option);
    }

    /// Replaces the first option with the same code, or appends.
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

    pub fn get_option(&self, code: u16) -> Option<&DhcpOption> {
        self.options.iter().find(|option| option.code() == code)
    }

    pub fn get_options(&self, code: u16) -> impl Iterator<Item = &DhcpOption> {
        self.options.iter().filter(move |option| option.code() == code)
    }

    /// True if the client listed `code` in its Option Request option.
    pub fn is_option_requested(&self, code: u16) -> bool {
        match self.get_option(option_code::ORO) {
            Some(DhcpOption::Oro(codes)) => codes.contains(&code),
            _ => false,
        }
    }

    pub fn client_id(&self) -> Option<&[u8]> {
        match self.get_option(option_code::CLIENT_ID) {
            Some(DhcpOption::ClientId(bytes)) => Some(bytes),
            _ => None,
        }
    }

    pub fn server_id(&self) -> Option<&[u8]> {
        match self.get_option(option_code::SERVER_ID) {
            Some(DhcpOption::ServerId(bytes)) => Some(bytes),
            _ => None,
        }
    }

    /// The first IA_NA option, if any.
    pub fn one_iana(&self) -> Option<&IaNa> {
        match self.get_option(option_code::IA_NA) {
            Some(DhcpOption::IaNa(ia)) => Some(ia),
            _ => None,
        }
    }

    pub fn iapd(&self) -> Vec<&IaPd> {
        self.get_options(option_code::IA_PD)
            .filter_map(|option| match option {
                DhcpOption::IaPd(ia) => Some(ia),
                _ => None,
            })
            .collect()
    }

    pub fn vendor_classes(&self) -> Vec<&VendorClass> {
        self.get_options(option_code::VENDOR_CLASS)
            .filter_map(|option| match option {
                DhcpOption::VendorClass(class) => Some(class),
                _ => None,
            })
            .collect()
    }

    pub fn arch_types(&self) -> Option<&[u16]> {
        match self.get_option(option_code::CLIENT_ARCH_TYPE) {
            Some(DhcpOption::ClientArchType(types)) => Some(types),
            _ => None,
        }
    }

    pub fn rapid_commit(&self) -> bool {
        self.get_option(option_code::RAPID_COMMIT).is_some()
    }

    /// One-line summary for debug logging.
    pub fn summary(&self) -> String {
        format!(
            "{} xid={:02x}{:02x}{:02x} options={}",
            self.msg_type,
            self.xid[0],
            self.xid[1],
            self.xid[2],
            self.options.len(),
        )
    }
}

/// One hop of a relay chain (RELAY-FORW or RELAY-REPL header plus options).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayFrame {
    pub msg_type: MessageType,
    pub hop_count: u8,
    pub link_addr: Ipv6Addr,
    pub peer_addr: Ipv6Addr,
    pub options: Vec<DhcpOption>,
}

impl RelayFrame {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 34 {
            return Err(Error::InvalidPacket("Relay message too short".to_string()));
        }
        let msg_type = MessageType::try_from(data[0])
            .map_err(|value| Error::InvalidPacket(format!("Unknown message type: {}", value)))?;
        if msg_type != MessageType::RelayForw && msg_type != MessageType::RelayRepl {
            return Err(Error::InvalidPacket(
                "Plain message where relay expected".to_string(),
            ));
        }
        let mut link = [0u8; 16];
        link.copy_from_slice(&data[2..18]);
        let mut peer = [0u8; 16];
        peer.copy_from_slice(&data[18..34]);
        Ok(Self {
            msg_type,
            hop_count: data[1],
            link_addr: Ipv6Addr::from(link),
            peer_addr: Ipv6Addr::from(peer),
            options: parse_options(&data[34..])?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut packet = vec![self.msg_type as u8, self.hop_count];
        packet.extend_from_slice(&self.link_addr.octets());
        packet.extend_from_slice(&self.peer_addr.octets());
        encode_options_into(&self.options, &mut packet);
        packet
    }

    pub fn relay_msg(&self) -> Option<&[u8]> {
        self.options.iter().find_map(|option| match option {
            DhcpOption::RelayMsg(bytes) => Some(bytes.as_slice()),
            _ => None,
        })
    }
}

/// A datagram on the DHCPv6 wire: either a plain message or a relay frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dhcpv6Packet {
    Message(Dhcpv6Message),
    Relay(RelayFrame),
}

impl Dhcpv6Packet {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::InvalidPacket("Empty datagram".to_string()));
        }
        match MessageType::try_from(data[0]) {
            Ok(MessageType::RelayForw) | Ok(MessageType::RelayRepl) => {
                Ok(Self::Relay(RelayFrame::parse(data)?))
            }
            Ok(_) => Ok(Self::Message(Dhcpv6Message::parse(data)?)),
            Err(value) => Err(Error::InvalidPacket(format!(
                "Unknown message type: {}",
                value
            ))),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Message(message) => message.encode(),
            Self::Relay(frame) => frame.encode(),
        }
    }

    pub fn is_relay(&self) -> bool {
        matches!(self, Self::Relay(_))
    }

    pub fn msg_type(&self) -> MessageType {
        match self {
            Self::Message(message) => message.msg_type,
            Self::Relay(frame) => frame.msg_type,
        }
    }

    /// Unwraps nested relay-forward chains down to the client message.
    pub fn inner_message(&self) -> Result<Dhcpv6Message> {
        match self {
            Self::Message(message) => Ok(message.clone()),
            Self::Relay(frame) => {
                let mut current = frame.clone();
                for _ in 0..MAX_RELAY_DEPTH {
                    let payload = current.relay_msg().ok_or_else(|| {
                        Error::InvalidPacket("Relay frame without relay message".to_string())
                    })?;
                    match Dhcpv6Packet::parse(payload)? {
                        Dhcpv6Packet::Message(message) => return Ok(message),
                        Dhcpv6Packet::Relay(next) => current = next,
                    }
                }
                Err(Error::InvalidPacket("Relay chain too deep".to_string()))
            }
        }
    }

    /// Rebuilds the relay chain of a RELAY-FORW request around a reply.
    ///
    /// Every relay frame keeps its hop count, link/peer addresses and options
    /// untouched; only the relay-message payload is replaced, innermost
    /// first. A forward chain without a relay-message payload is an error,
    /// never silently forwarded.
    pub fn relay_repl_from_relay_forw(&self, inner: &Dhcpv6Message) -> Result<Dhcpv6Packet> {
        let outermost = match self {
            Self::Relay(frame) if frame.msg_type == MessageType::RelayForw => frame,
            _ => {
                return Err(Error::InvalidPacket(
                    "Response re-encapsulation requires a relay-forward request".to_string(),
                ))
            }
        };

        let mut chain = Vec::new();
        let mut current = outermost.clone();
        loop {
            if chain.len() >= MAX_RELAY_DEPTH {
                return Err(Error::InvalidPacket("Relay chain too deep".to_string()));
            }
            let payload = current.relay_msg().map(<[u8]>::to_vec).ok_or_else(|| {
                Error::InvalidPacket("Relay frame without relay message".to_string())
            })?;
            chain.push(current);
            match Dhcpv6Packet::parse(&payload)? {
                Dhcpv6Packet::Relay(next) => current = next,
                Dhcpv6Packet::Message(_) => break,
            }
        }

        let mut payload = inner.encode();
        for frame in chain.iter().rev() {
            let mut reply = RelayFrame {
                msg_type: MessageType::RelayRepl,
                hop_count: frame.hop_count,
                link_addr: frame.link_addr,
                peer_addr: frame.peer_addr,
                options: frame.options.clone(),
            };
            for option in reply.options.iter_mut() {
                if option.code() == option_code::RELAY_MSG {
                    *option = DhcpOption::RelayMsg(std::mem::take(&mut payload));
                }
            }
            payload = reply.encode();
        }

        Dhcpv6Packet::parse(&payload)
    }
}

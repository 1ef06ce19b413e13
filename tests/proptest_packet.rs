use proptest::prelude::*;

use dhcpchain::v6::{self, Dhcpv6Message, Dhcpv6Packet};
use dhcpchain::Dhcpv4Packet;

const DHCP_MAGIC_COOKIE: [u8; 4] = [99, 130, 83, 99];
const DHCP_FIXED_HEADER_SIZE: usize = 240;

fn valid_header() -> Vec<u8> {
    let mut packet = vec![0u8; DHCP_FIXED_HEADER_SIZE];
    packet[0] = 1;
    packet[1] = 1;
    packet[2] = 6;
    packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
    packet
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(10000))]

    #[test]
    fn v4_parse_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = Dhcpv4Packet::parse(&data);
    }

    #[test]
    fn v4_parse_never_panics_on_valid_header_with_random_options(
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut packet = valid_header();
        packet.extend_from_slice(&options_data);
        let _ = Dhcpv4Packet::parse(&packet);
    }

    #[test]
    fn v4_parse_never_panics_on_random_option_lengths(
        option_code in 1u8..254,
        option_length in any::<u8>(),
        option_data in prop::collection::vec(any::<u8>(), 0..256)
    ) {
        let mut packet = valid_header();
        packet.push(option_code);
        packet.push(option_length);
        let actual_len = (option_length as usize).min(option_data.len());
        packet.extend_from_slice(&option_data[..actual_len]);
        packet.push(255);
        let _ = Dhcpv4Packet::parse(&packet);
    }

    #[test]
    fn v4_roundtrip_preserves_header_fields(
        xid in any::<u32>(),
        secs in any::<u16>(),
        flags in any::<u16>(),
        ciaddr in any::<[u8; 4]>(),
        yiaddr in any::<[u8; 4]>(),
        siaddr in any::<[u8; 4]>(),
        giaddr in any::<[u8; 4]>(),
        chaddr in any::<[u8; 16]>(),
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet[8..10].copy_from_slice(&secs.to_be_bytes());
        packet[10..12].copy_from_slice(&flags.to_be_bytes());
        packet[12..16].copy_from_slice(&ciaddr);
        packet[16..20].copy_from_slice(&yiaddr);
        packet[20..24].copy_from_slice(&siaddr);
        packet[24..28].copy_from_slice(&giaddr);
        packet[28..44].copy_from_slice(&chaddr);
        packet.push(255);

        if let Ok(parsed) = Dhcpv4Packet::parse(&packet) {
            let encoded = parsed.encode();
            let reparsed = Dhcpv4Packet::parse(&encoded).unwrap();

            prop_assert_eq!(parsed.xid, reparsed.xid);
            prop_assert_eq!(parsed.secs, reparsed.secs);
            prop_assert_eq!(parsed.flags, reparsed.flags);
            prop_assert_eq!(parsed.ciaddr, reparsed.ciaddr);
            prop_assert_eq!(parsed.yiaddr, reparsed.yiaddr);
            prop_assert_eq!(parsed.siaddr, reparsed.siaddr);
            prop_assert_eq!(parsed.giaddr, reparsed.giaddr);
            prop_assert_eq!(parsed.chaddr, reparsed.chaddr);
        }
    }

    #[test]
    fn v4_valid_packets_always_encode_to_at_least_300_bytes(
        xid in any::<u32>()
    ) {
        let mut packet = valid_header();
        packet[4..8].copy_from_slice(&xid.to_be_bytes());
        packet.push(255);

        if let Ok(parsed) = Dhcpv4Packet::parse(&packet) {
            let encoded = parsed.encode();
            prop_assert!(encoded.len() >= 300);
        }
    }

    #[test]
    fn v4_short_packets_always_rejected(
        data in prop::collection::vec(any::<u8>(), 0..240)
    ) {
        let result = Dhcpv4Packet::parse(&data);
        prop_assert!(result.is_err());
    }

    #[test]
    fn v4_bad_magic_cookie_always_rejected(
        cookie in any::<[u8; 4]>()
    ) {
        prop_assume!(cookie != DHCP_MAGIC_COOKIE);

        let mut packet = valid_header();
        packet[236..240].copy_from_slice(&cookie);
        packet.push(255);

        let result = Dhcpv4Packet::parse(&packet);
        prop_assert!(result.is_err());
    }

    #[test]
    fn v6_parse_never_panics_on_arbitrary_bytes(data: Vec<u8>) {
        let _ = Dhcpv6Packet::parse(&data);
    }

    #[test]
    fn v6_parse_never_panics_on_valid_type_with_random_options(
        msg_type in 1u8..=11,
        xid in any::<[u8; 3]>(),
        options_data in prop::collection::vec(any::<u8>(), 0..512)
    ) {
        let mut packet = vec![msg_type];
        packet.extend_from_slice(&xid);
        packet.extend_from_slice(&options_data);
        let _ = Dhcpv6Packet::parse(&packet);
    }

    #[test]
    fn v6_message_roundtrip_survives_reencode(
        msg_type in 1u8..=11,
        xid in any::<[u8; 3]>(),
        client_id in prop::collection::vec(any::<u8>(), 1..64),
        oro in prop::collection::vec(any::<u16>(), 0..16),
        elapsed in any::<u16>(),
    ) {
        let mut message = Dhcpv6Message::new(
            v6::MessageType::try_from(msg_type).unwrap(),
        );
        message.xid = xid;
        message.add_option(v6::DhcpOption::ClientId(client_id));
        message.add_option(v6::DhcpOption::Oro(oro));
        message.add_option(v6::DhcpOption::ElapsedTime(elapsed));

        let decoded = Dhcpv6Message::parse(&message.encode()).unwrap();
        prop_assert_eq!(&decoded, &message);
        // decode(encode(decode(b))) == decode(b)
        let redecoded = Dhcpv6Message::parse(&decoded.encode()).unwrap();
        prop_assert_eq!(redecoded, decoded);
    }

    #[test]
    fn v6_relay_roundtrip_survives_reencode(
        hop_count in any::<u8>(),
        link in any::<[u8; 16]>(),
        peer in any::<[u8; 16]>(),
        inner_xid in any::<[u8; 3]>(),
    ) {
        let mut inner = Dhcpv6Message::new(v6::MessageType::Solicit);
        inner.xid = inner_xid;
        let frame = v6::RelayFrame {
            msg_type: v6::MessageType::RelayForw,
            hop_count,
            link_addr: std::net::Ipv6Addr::from(link),
            peer_addr: std::net::Ipv6Addr::from(peer),
            options: vec![v6::DhcpOption::RelayMsg(inner.encode())],
        };

        let packet = Dhcpv6Packet::parse(&frame.encode()).unwrap();
        prop_assert_eq!(packet.encode(), frame.encode());
        prop_assert_eq!(packet.inner_message().unwrap(), inner);
    }
}

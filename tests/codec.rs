//! Wire codec tests.
//!
//! These tests verify the packet format as seen by two nodes that share a
//! wire format: what one encodes, the other decodes unchanged.

use dvnet::routing::DistanceVector;
use dvnet::{CodecError, DispatchError, Packet, PacketKind, WireFormat};

fn samples() -> Vec<Packet> {
    vec![
        Packet::data(3, 1, "hello"),
        Packet::data(99_999, 99_999, "widest addresses"),
        Packet::data(7, 2, ""),
        Packet::data(12, 40, vec![0u8, 255, b'2', b'\n']),
        Packet::control(11, r#"{"1":2,"3":0}"#),
    ]
}

#[test]
fn test_decode_inverts_encode() {
    for wire in [WireFormat::default(), WireFormat::new(6, 8)] {
        for packet in samples() {
            let bytes = wire.encode(&packet);
            assert_eq!(bytes.len(), wire.header_len() + packet.payload.len());
            assert_eq!(wire.decode(&bytes).unwrap(), packet);
        }
    }
}

#[test]
fn test_header_text() {
    let wire = WireFormat::default();
    assert_eq!(wire.encode(&Packet::data(3, 1, "hi")), b"00003100001hi");
    assert_eq!(wire.encode(&Packet::control(10, "{}")), b"00000200010{}");
}

#[test]
fn test_mismatched_formats_do_not_interoperate() {
    let sender = WireFormat::new(5, 5);
    let receiver = WireFormat::new(4, 5);
    let bytes = sender.encode(&Packet::data(3, 1, "hello"));

    // The receiver reads the last destination digit as the kind tag
    assert_eq!(receiver.decode(&bytes), Err(CodecError::UnknownKind(b'3')));
}

#[test]
fn test_malformed_inputs() {
    let wire = WireFormat::default();

    assert_eq!(
        wire.decode(b""),
        Err(CodecError::Truncated { len: 0, header: 11 })
    );
    assert_eq!(
        wire.decode(b"0000310000"),
        Err(CodecError::Truncated { len: 10, header: 11 })
    );
    assert_eq!(
        wire.decode(b"0x003100001"),
        Err(CodecError::InvalidAddress { field: "destination" })
    );
    assert_eq!(
        wire.decode(b"000031 0001"),
        Err(CodecError::InvalidAddress { field: "source" })
    );
    assert_eq!(wire.decode(b"00003900001"), Err(CodecError::UnknownKind(b'9')));
}

#[test]
fn test_decode_errors_classify_for_dispatch() {
    let wire = WireFormat::default();

    let unknown = DispatchError::from(wire.decode(b"00003900001").unwrap_err());
    assert_eq!(unknown, DispatchError::UnknownProtocol(b'9'));

    let short = DispatchError::from(wire.decode(b"0003").unwrap_err());
    assert!(matches!(short, DispatchError::MalformedPacket(_)));
}

#[test]
fn test_control_payload_carries_vector() {
    let wire = WireFormat::default();
    let vector: DistanceVector = [(1, 2), (3, 0), (100_000, 7)].into_iter().collect();

    let packet = Packet::control(3, vector.encode().unwrap());
    let decoded = wire.decode(&wire.encode(&packet)).unwrap();

    assert_eq!(decoded.kind, PacketKind::Control);
    assert_eq!(decoded.destination, dvnet::LINK_LOCAL);
    assert_eq!(DistanceVector::decode(&decoded.payload).unwrap(), vector);
}

#[test]
fn test_bad_vector_payload() {
    assert!(matches!(
        DistanceVector::decode(b"not a vector"),
        Err(CodecError::InvalidVector(_))
    ));
    assert!(matches!(
        DistanceVector::decode(br#"{"1":-4}"#),
        Err(CodecError::InvalidVector(_))
    ));
}

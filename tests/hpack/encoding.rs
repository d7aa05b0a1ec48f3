//! Encoding, checked by decoding with an independent codec.

use h2_wire_client::{Header, HeaderCodec};

fn request_fields() -> Vec<Header> {
    vec![
        Header::new(":method", "GET"),
        Header::new(":scheme", "https"),
        Header::new(":authority", "example.com"),
        Header::new(":path", "/index.html"),
        Header::new("accept", "text/html"),
        Header::new("user-agent", "h2-wire-client"),
    ]
}

#[test]
fn test_static_fields_encode_to_single_bytes() {
    let mut codec = HeaderCodec::new();
    let block = codec.encode(&[Header::new(":method", "GET"), Header::new(":path", "/")]);
    assert_eq!(&block[..], &[0x82, 0x84]);
}

#[test]
fn test_peer_decodes_in_order() {
    let mut ours = HeaderCodec::new();
    let mut theirs = HeaderCodec::new();

    let fields = request_fields();
    assert_eq!(theirs.decode(&ours.encode(&fields)).unwrap(), fields);
}

#[test]
fn test_repeated_block_shrinks() {
    let mut ours = HeaderCodec::new();
    let mut theirs = HeaderCodec::new();
    // Names absent from the static table are inserted into the dynamic one.
    let fields = vec![Header::new("x-request-id", "7f3a"), Header::new("x-tenant", "blue")];

    let first = ours.encode(&fields);
    let second = ours.encode(&fields);
    assert_eq!(second.len(), 2, "{first:?} then {second:?}");

    // The peer's table must track ours across blocks.
    assert_eq!(theirs.decode(&first).unwrap(), fields);
    assert_eq!(theirs.decode(&second).unwrap(), fields);
}

#[test]
fn test_duplicate_names_are_kept() {
    let mut ours = HeaderCodec::new();
    let mut theirs = HeaderCodec::new();
    let fields = vec![
        Header::new(":status", "200"),
        Header::new("set-cookie", "a=1"),
        Header::new("set-cookie", "b=2"),
    ];
    assert_eq!(theirs.decode(&ours.encode(&fields)).unwrap(), fields);
}

#[test]
fn test_empty_list() {
    let mut codec = HeaderCodec::new();
    let block = codec.encode(&[]);
    assert!(block.is_empty());
    assert!(codec.decode(&block).unwrap().is_empty());
}

//! Tests for frame parsing

use h2_wire_client::{flags, frame_type, ErrorCode, Error, Frame, FrameHeader, FrameKind};

fn raw(length: u32, kind: u8, bits: u8, stream_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![(length >> 16) as u8, (length >> 8) as u8, length as u8, kind, bits];
    out.extend_from_slice(&stream_id.to_be_bytes());
    out.extend_from_slice(payload);
    out
}

fn code_of(result: Result<Frame, Error>) -> ErrorCode {
    match result {
        Err(e) => e.code(),
        Ok(frame) => panic!("expected decode failure, got {frame}"),
    }
}

#[test]
fn test_frame_header_parse() {
    let header = FrameHeader::parse(&[0, 0, 10, 1, 4, 0, 0, 0, 3]).unwrap();
    assert_eq!(header.length, 10);
    assert_eq!(header.frame_type, frame_type::HEADERS);
    assert_eq!(header.flags, flags::END_HEADERS);
    assert_eq!(header.stream_id, 3);
    assert_eq!(header.total_size(), 19);
}

#[test]
fn test_frame_header_needs_nine_bytes() {
    assert!(FrameHeader::parse(&[0, 0, 0, 4, 0, 0, 0, 0]).is_none());
}

#[test]
fn test_stream_id_clears_reserved_bit() {
    let header = FrameHeader::parse(&[0, 0, 0, 4, 0, 0x80, 0x00, 0x00, 0x05]).unwrap();
    assert_eq!(header.stream_id, 5, "Reserved bit should be cleared from stream ID");
}

#[test]
fn test_ping_parsing() {
    let frame = Frame::decode(&raw(8, frame_type::PING, 0, 0, &[1, 2, 3, 4, 5, 6, 7, 8])).unwrap();
    match frame {
        Frame::Ping(ping) => {
            assert!(!ping.ack);
            assert_eq!(ping.data, [1, 2, 3, 4, 5, 6, 7, 8]);
        }
        other => panic!("expected PING, got {other}"),
    }
}

#[test]
fn test_window_update_masks_reserved_bit() {
    let frame = Frame::decode(&raw(4, frame_type::WINDOW_UPDATE, 0, 5, &[0x80, 0x01, 0x00, 0x00])).unwrap();
    match frame {
        Frame::WindowUpdate(update) => {
            assert_eq!(update.stream_id, 5);
            assert_eq!(update.increment, 65536);
        }
        other => panic!("expected WINDOW_UPDATE, got {other}"),
    }
}

#[test]
fn test_settings_entries() {
    let payload = [0, 4, 0, 0, 0x80, 0, 0, 5, 0, 0, 0x40, 0];
    let frame = Frame::decode(&raw(12, frame_type::SETTINGS, 0, 0, &payload)).unwrap();
    match frame {
        Frame::Settings(settings) => {
            assert!(!settings.ack);
            assert_eq!(settings.get(4), Some(32768));
            assert_eq!(settings.get(5), Some(16384));
        }
        other => panic!("expected SETTINGS, got {other}"),
    }
}

#[test]
fn test_settings_with_ragged_length_still_decodes() {
    // Length validation belongs to the connection, not the codec.
    let frame = Frame::decode(&raw(7, frame_type::SETTINGS, 0, 0, &[0, 4, 0, 0, 0, 1, 9])).unwrap();
    assert_eq!(frame.kind(), FrameKind::Settings);
    assert_eq!(frame.payload_len(), 7);
}

#[test]
fn test_headers_with_padding_and_priority() {
    let mut payload = vec![2, 0x80, 0, 0, 1, 15];
    payload.extend_from_slice(&[0x82, 0x84]);
    payload.extend_from_slice(&[0, 0]);
    let bits = flags::PADDED | flags::PRIORITY | flags::END_HEADERS;
    let frame = Frame::decode(&raw(payload.len() as u32, frame_type::HEADERS, bits, 3, &payload)).unwrap();
    match frame {
        Frame::Headers(headers) => {
            assert_eq!(&headers.fragment[..], &[0x82, 0x84]);
            assert_eq!(headers.pad_length, Some(2));
            let priority = headers.priority.unwrap();
            assert!(priority.exclusive);
            assert_eq!(priority.dependency, 1);
            assert_eq!(priority.weight, 16);
            assert!(headers.end_headers);
            assert!(!headers.end_stream);
        }
        other => panic!("expected HEADERS, got {other}"),
    }
}

#[test]
fn test_push_promise_parsing() {
    let payload = [0, 0, 0, 2, 0x82];
    let frame = Frame::decode(&raw(5, frame_type::PUSH_PROMISE, flags::END_HEADERS, 3, &payload)).unwrap();
    match frame {
        Frame::PushPromise(push) => {
            assert_eq!(push.stream_id, 3);
            assert_eq!(push.promised_stream_id, 2);
            assert_eq!(&push.fragment[..], &[0x82]);
        }
        other => panic!("expected PUSH_PROMISE, got {other}"),
    }
}

#[test]
fn test_goaway_parsing() {
    let mut payload = vec![0, 0, 0, 7, 0, 0, 0, 1];
    payload.extend_from_slice(b"oops");
    let frame = Frame::decode(&raw(12, frame_type::GOAWAY, 0, 0, &payload)).unwrap();
    match frame {
        Frame::GoAway(goaway) => {
            assert_eq!(goaway.last_stream_id, 7);
            assert_eq!(goaway.error_code, ErrorCode::ProtocolError);
            assert_eq!(goaway.debug_text(), "oops");
        }
        other => panic!("expected GOAWAY, got {other}"),
    }
}

#[test]
fn test_unknown_error_code_is_kept() {
    let frame = Frame::decode(&raw(4, frame_type::RST_STREAM, 0, 1, &[0, 0, 0, 0x42])).unwrap();
    match frame {
        Frame::RstStream(rst) => assert_eq!(rst.error_code, ErrorCode::Unknown(0x42)),
        other => panic!("expected RST_STREAM, got {other}"),
    }
}

#[test]
fn test_unknown_type_is_protocol_error() {
    assert_eq!(code_of(Frame::decode(&raw(0, 0x20, 0, 0, &[]))), ErrorCode::ProtocolError);
}

#[test]
fn test_length_mismatch_is_protocol_error() {
    assert_eq!(
        code_of(Frame::decode(&raw(8, frame_type::PING, 0, 0, &[1, 2, 3]))),
        ErrorCode::ProtocolError
    );
}

#[test]
fn test_short_fixed_payloads_are_frame_size_errors() {
    for kind in [frame_type::PRIORITY, frame_type::RST_STREAM, frame_type::WINDOW_UPDATE, frame_type::PING] {
        assert_eq!(
            code_of(Frame::decode(&raw(2, kind, 0, 1, &[0, 1]))),
            ErrorCode::FrameSizeError,
            "frame type {kind}"
        );
    }
    assert_eq!(
        code_of(Frame::decode(&raw(4, frame_type::GOAWAY, 0, 0, &[0, 0, 0, 1]))),
        ErrorCode::FrameSizeError
    );
}

#[test]
fn test_padded_frame_without_payload_fails() {
    assert_eq!(
        code_of(Frame::decode(&raw(0, frame_type::DATA, flags::PADDED, 1, &[]))),
        ErrorCode::FrameSizeError
    );
}

#[test]
fn test_oversized_padding_is_reported_not_rejected() {
    let frame = Frame::decode(&raw(3, frame_type::DATA, flags::PADDED, 1, &[9, b'a', b'b'])).unwrap();
    assert_eq!(frame.pad_length(), Some(9));
    assert!(!frame.padding_fits());
}

#[test]
fn test_oversized_fixed_payload_is_left_to_the_connection() {
    let frame = Frame::decode(&raw(6, frame_type::RST_STREAM, 0, 1, &[0, 0, 0, 8, 0, 0])).unwrap();
    assert_eq!(frame.payload_len(), 6);
}

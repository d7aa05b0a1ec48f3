//! Tests for the buffering frame decoder

use h2_wire_client::frame::{connection_preface, split_header_block};
use h2_wire_client::{
    DataFrame, ErrorCode, Frame, FrameDecoder, FrameKind, PingFrame, SettingsFrame, CONNECTION_PREFACE,
};
use bytes::Bytes;

#[test]
fn test_frames_across_chunk_boundaries() {
    let mut wire = Frame::from(PingFrame::new([7; 8])).to_bytes().to_vec();
    wire.extend_from_slice(&Frame::from(DataFrame::new(1, &b"hello"[..], true)).to_bytes());

    let mut decoder = FrameDecoder::new();
    let mut frames = Vec::new();
    for byte in &wire {
        frames.extend(decoder.decode(std::slice::from_ref(byte)).unwrap());
    }
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].kind(), FrameKind::Ping);
    assert!(frames[1].is_end_stream());
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_partial_frame_stays_buffered() {
    let wire = Frame::from(DataFrame::new(1, &b"hello"[..], false)).to_bytes();
    let mut decoder = FrameDecoder::new();
    assert!(decoder.decode(&wire[..10]).unwrap().is_empty());
    assert_eq!(decoder.buffered(), 10);
    assert_eq!(decoder.decode(&wire[10..]).unwrap().len(), 1);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn test_preface_is_skipped_when_expected() {
    let settings = SettingsFrame::empty().with(4, 100);
    let wire = connection_preface(&settings);
    assert!(wire.starts_with(CONNECTION_PREFACE));

    let mut decoder = FrameDecoder::new();
    decoder.expect_preface(true);
    let frames = decoder.decode(&wire).unwrap();
    assert_eq!(frames, vec![Frame::Settings(settings)]);
}

#[test]
fn test_max_frame_size_is_enforced() {
    let mut decoder = FrameDecoder::new();
    decoder.set_max_frame_size(16);
    let wire = Frame::from(DataFrame::new(1, vec![0u8; 17], false)).to_bytes();
    match decoder.decode(&wire) {
        Err(e) => assert_eq!(e.code(), ErrorCode::FrameSizeError),
        Ok(frames) => panic!("expected FRAME_SIZE_ERROR, got {} frames", frames.len()),
    }
}

#[test]
fn test_default_limit_is_protocol_minimum() {
    let mut decoder = FrameDecoder::new();
    let fits = Frame::from(DataFrame::new(1, vec![0u8; 16_384], false)).to_bytes();
    assert_eq!(decoder.decode(&fits).unwrap().len(), 1);

    let too_big = Frame::from(DataFrame::new(1, vec![0u8; 16_385], false)).to_bytes();
    match decoder.decode(&too_big) {
        Err(e) => assert_eq!(e.code(), ErrorCode::FrameSizeError),
        Ok(frames) => panic!("expected FRAME_SIZE_ERROR, got {} frames", frames.len()),
    }
}

#[test]
fn test_header_block_split_into_continuations() {
    let block = Bytes::from(vec![0xaa; 25]);
    let frames = split_header_block(3, block, true, None, 10);
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0].kind(), FrameKind::Headers);
    assert!(frames[0].is_end_stream());
    assert_eq!(frames[0].end_headers(), Some(false));
    assert_eq!(frames[1].kind(), FrameKind::Continuation);
    assert_eq!(frames[1].end_headers(), Some(false));
    assert_eq!(frames[2].end_headers(), Some(true));
    assert_eq!(frames[2].payload_len(), 5);
}

#[test]
fn test_small_header_block_is_a_single_frame() {
    let frames = split_header_block(5, Bytes::from_static(&[0x82]), false, None, 16_384);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].end_headers(), Some(true));
    assert!(!frames[0].is_end_stream());
}

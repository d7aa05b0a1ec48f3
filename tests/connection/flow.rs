//! Send and receive flow control.

use std::thread;
use std::time::Duration;

use h2_wire_client::{
    settings_id, DataFrame, ErrorCode, Frame, Headers, Request, SettingsFrame, StreamState,
    WindowUpdateFrame,
};

use super::{expect_connection_error, goaway_code, quick, rst_code, Peer};

fn data_frames(frames: &[Frame]) -> Vec<&DataFrame> {
    frames
        .iter()
        .filter_map(|f| match f {
            Frame::Data(d) => Some(d),
            _ => None,
        })
        .collect()
}

fn data_total(frames: &[Frame]) -> usize {
    data_frames(frames).iter().map(|d| d.data.len()).sum()
}

#[test]
fn test_large_body_is_fragmented_across_windows() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&Headers::request("POST", "http", None, "/upload"), false).unwrap();
    peer.sent();

    let sender = {
        let stream = stream.clone();
        thread::spawn(move || stream.data(vec![7u8; 100_000], true))
    };

    // Both windows start at 65,535: the sender stalls once they are spent.
    let mut frames = peer.wait_for(Duration::from_secs(5), |frames| data_total(frames) == 65_535);
    thread::sleep(Duration::from_millis(20));
    frames.extend(peer.sent());
    assert_eq!(data_total(&frames), 65_535);
    assert_eq!(peer.conn.available_window(), 0);
    assert_eq!(stream.available_window(), 0);
    assert!(data_frames(&frames).iter().all(|d| !d.end_stream));

    peer.send(WindowUpdateFrame::new(0, 50_000)).unwrap();
    peer.send(WindowUpdateFrame::new(stream.id(), 50_000)).unwrap();
    frames.extend(peer.wait_for(Duration::from_secs(5), |more| data_total(more) == 100_000 - 65_535));
    sender.join().unwrap().unwrap();

    let data = data_frames(&frames);
    assert_eq!(data_total(&frames), 100_000);
    assert!(data.iter().all(|d| d.data.len() <= 16_384 && !d.data.is_empty()));
    let (last, rest) = data.split_last().unwrap();
    assert!(last.end_stream);
    assert!(rest.iter().all(|d| !d.end_stream));
    assert_eq!(peer.conn.available_window(), 50_000 - (100_000 - 65_535));
    assert_eq!(stream.available_window(), 50_000 - (100_000 - 65_535));
    assert_eq!(stream.state(), StreamState::HalfClosedLocal);
}

#[test]
fn test_chunks_follow_peer_max_frame_size() {
    let mut peer = Peer::connected(quick());
    peer.send(SettingsFrame::empty().with(settings_id::MAX_FRAME_SIZE, 20_000)).unwrap();
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&Headers::request("POST", "http", None, "/"), false).unwrap();
    peer.sent();

    stream.data(vec![1u8; 30_000], true).unwrap();
    let frames = peer.sent();
    let sizes: Vec<usize> = data_frames(&frames).iter().map(|d| d.data.len()).collect();
    assert_eq!(sizes, vec![20_000, 10_000]);
}

#[test]
fn test_initial_window_change_keeps_consumed_credit() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&Headers::request("POST", "http", None, "/"), false).unwrap();
    stream.data(vec![0u8; 20], false).unwrap();
    assert_eq!(stream.available_window(), 65_515);

    peer.send(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 100)).unwrap();
    assert_eq!(stream.available_window(), 80);
    // The connection window is not affected by SETTINGS.
    assert_eq!(peer.conn.available_window(), 65_515);
    assert!(!peer.sent().is_empty());
}

#[test]
fn test_window_may_go_negative() {
    let peer = Peer::connected(quick());
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&Headers::request("POST", "http", None, "/"), false).unwrap();
    stream.data(vec![0u8; 100], false).unwrap();

    peer.send(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 50)).unwrap();
    assert_eq!(stream.available_window(), -50);
    peer.send(WindowUpdateFrame::new(stream.id(), 60)).unwrap();
    assert_eq!(stream.available_window(), 10);
}

#[test]
fn test_new_streams_use_peer_initial_window() {
    let peer = Peer::connected(quick());
    peer.send(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 1_000)).unwrap();
    assert_eq!(peer.conn.new_stream().unwrap().available_window(), 1_000);
}

#[test]
fn test_received_data_is_replenished() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let headers = peer.headers(3, &[(":status", "200")], false);
    peer.send(headers).unwrap();
    peer.sent();

    peer.send(DataFrame::new(3, vec![0u8; 1_000], false)).unwrap();
    let updates: Vec<(u32, u32)> = peer
        .sent()
        .iter()
        .filter_map(|f| match f {
            Frame::WindowUpdate(w) => Some((w.stream_id, w.increment)),
            _ => None,
        })
        .collect();
    assert_eq!(updates, vec![(0, 1_000), (3, 1_000)]);
    assert_eq!(stream.receive_window(), 65_535);
}

#[test]
fn test_manual_window_updates() {
    let mut peer = Peer::connected(quick().with_auto_window_update(false));
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let headers = peer.headers(3, &[(":status", "200")], false);
    peer.send(headers).unwrap();
    peer.sent();

    peer.send(DataFrame::new(3, vec![0u8; 1_000], false)).unwrap();
    assert!(peer.sent().is_empty());
    assert_eq!(stream.receive_window(), 64_535);

    stream.window_update(1_000).unwrap();
    assert!(matches!(&peer.sent()[..], [Frame::WindowUpdate(w)] if w.stream_id == 3 && w.increment == 1_000));
    assert_eq!(stream.receive_window(), 65_535);
}

#[test]
fn test_receive_window_overrun_is_flow_control_error() {
    let mut peer = Peer::connected(quick().with_auto_window_update(false));
    peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let headers = peer.headers(3, &[(":status", "200")], false);
    peer.send(headers).unwrap();
    peer.sent();

    for _ in 0..4 {
        peer.send(DataFrame::new(3, vec![0u8; 15_000], false)).unwrap();
    }
    let result = peer.send(DataFrame::new(3, vec![0u8; 6_000], false));
    expect_connection_error(result, ErrorCode::FlowControlError);
    assert_eq!(goaway_code(&peer.sent()), Some(ErrorCode::FlowControlError));
}

#[test]
fn test_zero_increment_on_connection_is_connection_error() {
    let mut peer = Peer::connected(quick());
    let result = peer.send(WindowUpdateFrame::new(0, 0));
    expect_connection_error(result, ErrorCode::ProtocolError);
    assert_eq!(goaway_code(&peer.sent()), Some(ErrorCode::ProtocolError));
}

#[test]
fn test_zero_increment_on_stream_is_stream_error() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    peer.sent();
    peer.send(WindowUpdateFrame::new(3, 0)).unwrap();
    assert_eq!(rst_code(&peer.sent(), 3), Some(ErrorCode::ProtocolError));
    assert_eq!(stream.state(), StreamState::ResetLocal);
    assert!(!peer.conn.is_closed());
}

#[test]
fn test_window_update_on_idle_stream_is_connection_error() {
    let mut peer = Peer::connected(quick());
    let result = peer.send(WindowUpdateFrame::new(9, 10));
    expect_connection_error(result, ErrorCode::ProtocolError);
    assert_eq!(goaway_code(&peer.sent()), Some(ErrorCode::ProtocolError));

    let mut peer = Peer::connected(quick());
    let unopened = peer.conn.new_stream().unwrap();
    expect_connection_error(peer.send(WindowUpdateFrame::new(unopened.id(), 10)), ErrorCode::ProtocolError);
    assert!(peer.conn.is_closed());
}

#[test]
fn test_window_update_on_drained_stream_is_ignored() {
    let mut peer = Peer::connected(quick().with_drain_on_close(true));
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let headers = peer.headers(3, &[(":status", "204")], true);
    peer.send(headers).unwrap();
    stream.response().unwrap();
    assert!(peer.conn.stream(3).is_none());
    peer.sent();

    peer.send(WindowUpdateFrame::new(3, 10)).unwrap();
    assert!(peer.sent().is_empty());
    assert!(!peer.conn.is_closed());
}

#[test]
fn test_connection_window_overflow() {
    let mut peer = Peer::connected(quick());
    let result = peer.send(WindowUpdateFrame::new(0, 0x7fff_ffff));
    expect_connection_error(result, ErrorCode::FlowControlError);
    assert_eq!(goaway_code(&peer.sent()), Some(ErrorCode::FlowControlError));
    assert_eq!(peer.conn.available_window(), 65_535);
}

#[test]
fn test_stream_window_overflow_resets_stream() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&Headers::request("POST", "http", None, "/"), false).unwrap();
    peer.sent();
    peer.send(WindowUpdateFrame::new(3, 0x7fff_ffff)).unwrap();
    assert_eq!(rst_code(&peer.sent(), 3), Some(ErrorCode::FlowControlError));
    assert_eq!(stream.available_window(), 65_535);
}

#[test]
fn test_blocked_sender_is_released_on_close() {
    let peer = Peer::connected(quick());
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&Headers::request("POST", "http", None, "/"), false).unwrap();
    let sender = {
        let stream = stream.clone();
        thread::spawn(move || stream.data(vec![0u8; 70_000], true))
    };
    thread::sleep(Duration::from_millis(50));
    peer.conn.close().unwrap();
    assert!(sender.join().unwrap().is_err());
}

//! Preface, SETTINGS negotiation, PING and GOAWAY.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use h2_wire_client::{
    settings_id, Error, ErrorCode, Frame, FrameKind, GoAwayFrame, PingFrame, SettingsFrame,
    CONNECTION_PREFACE,
};

use super::{goaway_code, quick, Peer};

#[test]
fn test_preface_is_magic_then_settings() {
    let config = quick().with_preface_settings(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 1 << 20));
    let peer = Peer::new(config);
    peer.conn.start().unwrap();

    let bytes = peer.transport.take();
    assert!(bytes.starts_with(CONNECTION_PREFACE));
    let frame = Frame::decode(&bytes[CONNECTION_PREFACE.len()..]).unwrap();
    match frame {
        Frame::Settings(s) => {
            assert!(!s.ack);
            assert_eq!(s.get(settings_id::INITIAL_WINDOW_SIZE), Some(1 << 20));
        }
        other => panic!("expected SETTINGS, got {other}"),
    }
}

#[test]
fn test_handshake_completes_on_settings_ack() {
    let config = quick().with_preface_settings(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 1000));
    let peer = Peer::new(config);
    peer.conn.start().unwrap();
    peer.send(SettingsFrame::ack()).unwrap();
    peer.conn.await_handshake().unwrap();
    // Second wait returns immediately.
    peer.conn.await_handshake().unwrap();
    assert_eq!(peer.conn.local_settings().initial_window_size, 1000);
}

#[test]
fn test_handshake_times_out_without_ack() {
    let peer = Peer::new(quick().with_handshake_timeout(Duration::from_millis(30)));
    peer.conn.start().unwrap();
    assert!(matches!(peer.conn.await_handshake(), Err(Error::HandshakeTimeout)));
}

#[test]
fn test_handshake_fails_when_connection_closes() {
    let peer = Peer::new(quick());
    peer.conn.start().unwrap();
    peer.send(GoAwayFrame::new(0, ErrorCode::NoError, "")).unwrap();
    peer.conn.close().unwrap();
    assert!(matches!(peer.conn.await_handshake(), Err(Error::HandshakeFailed(_))));
}

#[test]
fn test_peer_settings_are_applied_and_acknowledged() {
    let mut peer = Peer::connected(quick());
    peer.send(
        SettingsFrame::empty()
            .with(settings_id::MAX_CONCURRENT_STREAMS, 10)
            .with(settings_id::MAX_FRAME_SIZE, 32_768),
    )
    .unwrap();

    let frames = peer.sent();
    assert!(matches!(&frames[..], [Frame::Settings(s)] if s.ack));
    let remote = peer.conn.remote_settings();
    assert_eq!(remote.max_concurrent_streams, Some(10));
    assert_eq!(remote.max_frame_size, 32_768);
}

#[test]
fn test_manual_settings_ack() {
    let mut peer = Peer::connected(quick().with_settings_ack(false));
    peer.send(SettingsFrame::empty().with(settings_id::ENABLE_PUSH, 0)).unwrap();
    assert!(peer.sent().is_empty());
    assert!(!peer.conn.remote_settings().enable_push);

    peer.conn.ack_settings().unwrap();
    assert!(matches!(&peer.sent()[..], [Frame::Settings(s)] if s.ack));
}

#[test]
fn test_invalid_peer_settings_close_the_connection() {
    let mut peer = Peer::connected(quick());
    let result = peer.send(SettingsFrame::empty().with(settings_id::ENABLE_PUSH, 2));
    super::expect_connection_error(result, ErrorCode::ProtocolError);
    assert_eq!(goaway_code(&peer.sent()), Some(ErrorCode::ProtocolError));
    assert!(peer.conn.is_closed());
    assert!(peer.transport.is_closed());
}

#[test]
fn test_settings_round_trip_waits_for_ack() {
    let mut peer = Peer::connected(quick());
    let conn = peer.conn.clone();
    let waiter = thread::spawn(move || {
        conn.settings(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 1_000_000))
    });

    peer.wait_for(Duration::from_secs(2), |frames| {
        frames.iter().any(|f| matches!(f, Frame::Settings(s) if !s.ack))
    });
    peer.send(SettingsFrame::ack()).unwrap();

    waiter.join().unwrap().unwrap();
    assert_eq!(peer.conn.local_settings().initial_window_size, 1_000_000);
}

#[test]
fn test_unsent_settings_are_not_awaited() {
    let mut peer = Peer::connected(quick());
    peer.transport.fail_writes(true);
    assert!(matches!(
        peer.conn.settings(SettingsFrame::empty().with(settings_id::MAX_FRAME_SIZE, 20_000)),
        Err(Error::Send(_))
    ));
    peer.transport.fail_writes(false);

    let conn = peer.conn.clone();
    let waiter = thread::spawn(move || conn.settings(SettingsFrame::empty().with(settings_id::INITIAL_WINDOW_SIZE, 1_000)));
    peer.wait_for(Duration::from_secs(2), |frames| {
        frames.iter().any(|f| matches!(f, Frame::Settings(s) if !s.ack))
    });
    peer.send(SettingsFrame::ack()).unwrap();

    waiter.join().unwrap().unwrap();
    let local = peer.conn.local_settings();
    assert_eq!(local.initial_window_size, 1_000);
    assert_eq!(local.max_frame_size, 16_384);
}

#[test]
fn test_settings_round_trip_times_out() {
    let peer = Peer::connected(quick().with_settings_timeout(Duration::from_millis(30)));
    assert!(matches!(
        peer.conn.settings(SettingsFrame::empty()),
        Err(Error::SettingsTimeout { goaway: None })
    ));
}

#[test]
fn test_inbound_ping_is_echoed() {
    let mut peer = Peer::connected(quick());
    peer.send(PingFrame::new(*b"12345678")).unwrap();
    match &peer.sent()[..] {
        [Frame::Ping(ping)] => {
            assert!(ping.ack);
            assert_eq!(&ping.data, b"12345678");
        }
        other => panic!("expected one PING ACK, got {other:?}"),
    }
}

#[test]
fn test_ping_round_trip() {
    let mut peer = Peer::connected(quick());
    let conn = peer.conn.clone();
    let pinger = thread::spawn(move || conn.ping());

    let frames = peer.wait_for(Duration::from_secs(2), |frames| {
        frames.iter().any(|f| f.kind() == FrameKind::Ping)
    });
    let data = frames
        .iter()
        .find_map(|f| match f {
            Frame::Ping(p) if !p.ack => Some(p.data),
            _ => None,
        })
        .unwrap();
    // A stray ACK does not resolve the pending ping.
    peer.send(PingFrame::new([0xff; 8]).to_ack()).unwrap();
    peer.send(PingFrame::new(data).to_ack()).unwrap();

    let rtt = pinger.join().unwrap().unwrap();
    assert!(rtt < Duration::from_secs(2));
}

#[test]
fn test_ping_times_out() {
    let peer = Peer::connected(quick().with_ping_timeout(Duration::from_millis(30)));
    assert!(matches!(peer.conn.ping(), Err(Error::PingTimeout { .. })));
}

#[test]
fn test_goaway_is_sent_once() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&h2_wire_client::Headers::request("GET", "http", None, "/"), true).unwrap();
    peer.sent();
    let response = peer.headers(stream.id(), &[(":status", "200")], false);
    peer.send(response).unwrap();

    peer.conn.go_away(ErrorCode::EnhanceYourCalm, "slow down").unwrap();
    peer.conn.go_away(ErrorCode::ProtocolError, "again").unwrap();
    peer.conn.close().unwrap();

    let goaways: Vec<_> = peer
        .sent()
        .into_iter()
        .filter_map(|f| match f {
            Frame::GoAway(g) => Some(g),
            _ => None,
        })
        .collect();
    assert_eq!(goaways.len(), 1);
    assert_eq!(goaways[0].error_code, ErrorCode::EnhanceYourCalm);
    assert_eq!(goaways[0].last_stream_id, stream.id());
    assert_eq!(goaways[0].debug_text(), "slow down");
    assert!(peer.conn.is_closed());
}

#[test]
fn test_graceful_close() {
    let mut peer = Peer::connected(quick());
    peer.conn.close().unwrap();
    match &peer.sent()[..] {
        [Frame::GoAway(g)] => {
            assert_eq!(g.error_code, ErrorCode::NoError);
            assert_eq!(g.debug_text(), "graceful shutdown");
        }
        other => panic!("expected GOAWAY, got {other:?}"),
    }
    assert!(matches!(peer.conn.new_stream(), Err(Error::Closed { .. })));
    assert!(matches!(peer.conn.send_frame(&Frame::from(PingFrame::new([0; 8]))), Err(Error::Closed { .. })));
}

#[test]
fn test_inbound_goaway_is_surfaced() {
    let peer = Peer::connected(quick().with_response_idle_timeout(Duration::from_millis(200)));
    let stream = peer.conn.new_stream().unwrap();
    stream.headers(&h2_wire_client::Headers::request("GET", "http", None, "/"), true).unwrap();

    peer.send(GoAwayFrame::new(0, ErrorCode::EnhanceYourCalm, "busy")).unwrap();
    let goaway = peer.conn.last_goaway().unwrap();
    assert_eq!(goaway.error_code, ErrorCode::EnhanceYourCalm);
    assert_eq!(goaway.debug_data, "busy");

    // Stream 3 is above last_stream_id, so the peer never processed it.
    match stream.response() {
        Err(Error::Closed { goaway: Some(g) }) => assert_eq!(g.debug_data, "busy"),
        other => panic!("expected closed with GOAWAY, got {other:?}"),
    }
    assert!(matches!(peer.conn.new_stream(), Err(Error::Closed { .. })));
}

#[test]
fn test_frame_history_and_observer() {
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let peer = Peer::connected(
        quick()
            .with_frame_history(2)
            .with_frame_observer(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
    );
    peer.send(PingFrame::new([1; 8])).unwrap();
    peer.send(PingFrame::new([2; 8])).unwrap();

    let history = peer.conn.frame_history();
    assert_eq!(history.len(), 2);
    assert!(matches!(&history[1].frame, Frame::Ping(p) if p.data == [2; 8]));
    // Two handshake SETTINGS plus the two pings.
    assert_eq!(seen.load(Ordering::SeqCst), 4);
}

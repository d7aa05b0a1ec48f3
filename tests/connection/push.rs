//! Server push.

use std::sync::Arc;

use parking_lot::Mutex;

use h2_wire_client::{
    settings_id, ContinuationFrame, DataFrame, Error, ErrorCode, PushKey, PushPromiseFrame, PushRequest,
    Request, SettingsFrame, StreamState,
};

use super::{expect_connection_error, quick, Peer};

const PUSHED: &[(&str, &str)] = &[
    (":method", "GET"),
    (":scheme", "http"),
    (":authority", "localhost"),
    (":path", "/style.css"),
];

#[test]
fn test_pushed_stream_lifecycle() {
    let observed: Arc<Mutex<Vec<PushRequest>>> = Arc::default();
    let sink = Arc::clone(&observed);
    let mut peer = Peer::connected(quick().with_push_observer(move |push| sink.lock().push(push.clone())));
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();

    let block = peer.block(PUSHED);
    peer.send(PushPromiseFrame::new(3, 2, block, true)).unwrap();

    let pushed = peer.conn.stream(2).unwrap();
    assert_eq!(pushed.state(), StreamState::ReservedRemote);
    assert_eq!(pushed.parent(), Some(3));
    let push = pushed.push_request().unwrap();
    assert_eq!(
        push.key,
        PushKey {
            stream_id: 3,
            promised_stream_id: 2
        }
    );
    assert_eq!(push.path(), Some("/style.css"));
    assert_eq!(push.method(), Some("GET"));
    assert_eq!(observed.lock().len(), 1);
    assert_eq!(stream.promised().len(), 1);

    let headers = peer.headers(2, &[(":status", "200"), ("content-type", "text/css")], false);
    peer.send(headers).unwrap();
    assert_eq!(pushed.state(), StreamState::HalfClosedLocal);
    peer.send(DataFrame::new(2, &b"body{}"[..], true)).unwrap();
    assert_eq!(pushed.state(), StreamState::Closed);

    let headers = peer.headers(3, &[(":status", "200")], true);
    peer.send(headers).unwrap();
    let response = stream.response().unwrap();
    assert_eq!(response.promises.len(), 1);

    let mut pushed = response.pushed();
    assert_eq!(pushed.len(), 1);
    let (push, css) = &mut pushed[0];
    assert_eq!(push.path(), Some("/style.css"));
    assert_eq!(css.stream_id, 2);
    assert_eq!(css.content_type(), Some("text/css"));
    assert_eq!(css.text().unwrap(), "body{}");
    assert!(response.pushed().is_empty());
}

#[test]
fn test_pushed_response_finishing_after_the_parent() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    peer.send(PushPromiseFrame::new(3, 2, block, true)).unwrap();
    let headers = peer.headers(3, &[(":status", "200")], true);
    peer.send(headers).unwrap();

    let response = stream.response().unwrap();
    assert!(response.pushed().is_empty());

    let headers = peer.headers(2, &[(":status", "200")], false);
    peer.send(headers).unwrap();
    peer.send(DataFrame::new(2, &b"late"[..], true)).unwrap();

    let mut late = response.pushed_response(&response.promises[0]).unwrap();
    assert_eq!(late.text().unwrap(), "late");
    assert!(response.pushed_response(&response.promises[0]).is_err());
}

#[test]
fn test_reset_push_is_left_out() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    peer.send(PushPromiseFrame::new(3, 2, block, true)).unwrap();
    peer.conn.stream(2).unwrap().reset(ErrorCode::Cancel).unwrap();
    let headers = peer.headers(3, &[(":status", "200")], true);
    peer.send(headers).unwrap();

    let response = stream.response().unwrap();
    assert_eq!(response.promises.len(), 1);
    assert!(matches!(
        response.pushed_response(&response.promises[0]),
        Err(Error::StreamReset { stream_id: 2, code: ErrorCode::Cancel, by_peer: false })
    ));
    assert!(response.pushed().is_empty());
}

#[test]
fn test_push_promise_across_continuation() {
    let mut peer = Peer::connected(quick());
    let stream = peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    let (first, rest) = block.split_at(2);
    peer.send(PushPromiseFrame::new(3, 2, first.to_vec(), false)).unwrap();
    assert!(peer.conn.stream(2).unwrap().push_request().is_none());
    peer.send(ContinuationFrame::new(3, rest.to_vec(), true)).unwrap();

    assert_eq!(stream.promised()[0].path(), Some("/style.css"));
    assert!(peer.conn.stream(2).unwrap().push_request().is_some());
}

#[test]
fn test_push_promise_rejected_when_disabled() {
    let config = quick().with_preface_settings(SettingsFrame::empty().with(settings_id::ENABLE_PUSH, 0));
    let mut peer = Peer::connected(config);
    assert!(!peer.conn.local_settings().enable_push);
    peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    expect_connection_error(peer.send(PushPromiseFrame::new(3, 2, block, true)), ErrorCode::ProtocolError);
}

#[test]
fn test_push_promise_needs_fresh_even_id() {
    let mut peer = Peer::connected(quick());
    peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    expect_connection_error(peer.send(PushPromiseFrame::new(3, 5, block, true)), ErrorCode::ProtocolError);

    let mut peer = Peer::connected(quick());
    peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    peer.send(PushPromiseFrame::new(3, 4, block, true)).unwrap();
    let block = peer.block(PUSHED);
    expect_connection_error(peer.send(PushPromiseFrame::new(3, 2, block, true)), ErrorCode::ProtocolError);
}

#[test]
fn test_pushed_stream_can_be_refused() {
    let mut peer = Peer::connected(quick());
    peer.conn.request(&Request::get("http", "localhost", "/")).unwrap();
    let block = peer.block(PUSHED);
    peer.send(PushPromiseFrame::new(3, 2, block, true)).unwrap();
    peer.sent();

    let pushed = peer.conn.stream(2).unwrap();
    pushed.reset(ErrorCode::RefusedStream).unwrap();
    assert_eq!(pushed.state(), StreamState::ResetLocal);
    assert_eq!(super::rst_code(&peer.sent(), 2), Some(ErrorCode::RefusedStream));
}

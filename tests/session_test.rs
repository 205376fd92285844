//! End-to-end tests of the session server over real sockets.

mod common;

use common::{Client, TestDisplay};
use rust_opi::instrument::mock::MockInstrument;
use rust_opi::instrument::relay::Relay;
use rust_opi::presentation::{EngineState, RenderCall};
use rust_opi::session::{Session, SessionState};
use std::time::Duration;

#[tokio::test]
async fn test_display_round_trip() {
    let display = TestDisplay::start();
    let session = Session::bind("127.0.0.1:0", display.device()).await.unwrap();
    let mut client = Client::connect(session.local_addr()).await;

    let reply = client.request(r#"{"command":"INITIALIZE"}"#).await;
    assert!(!reply.error);
    assert_eq!(reply.msg["initialized"], true);

    let reply = client
        .request(r#"{"command":"SETUP","eye":"left","bgLum":10}"#)
        .await;
    assert!(!reply.error, "{}", reply.msg);

    client
        .send(r#"{"command":"PRESENT","stim.length":1,"t":[200],"w":[1500]}"#)
        .await;
    let mut state = display.handle.state();
    for _ in 0..200 {
        if state == EngineState::Showing || state == EngineState::AwaitingResponse {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        state = display.handle.state();
    }
    assert_ne!(state, EngineState::Idle);
    assert!(display.handle.button().press());

    let reply = client.reply().await.unwrap();
    assert!(!reply.error, "{}", reply.msg);
    assert_eq!(reply.msg["seen"], true);
    assert!(reply.msg["time"].as_u64().unwrap() < 1500);

    let reply = client.request(r#"{"command":"CLOSE"}"#).await;
    assert!(!reply.error);
    assert!(reply.close);

    session.closed().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(client.reply().await.is_none());

    let calls = display.renderer.calls();
    assert_eq!(calls.first(), Some(&RenderCall::Show));
    assert!(calls.contains(&RenderCall::Close));
}

#[tokio::test]
async fn test_unanswered_presentation_is_unseen() {
    let display = TestDisplay::start();
    let session = Session::bind("127.0.0.1:0", display.device()).await.unwrap();
    let mut client = Client::connect(session.local_addr()).await;

    client.request(r#"{"command":"INITIALIZE"}"#).await;
    let reply = client
        .request(r#"{"command":"PRESENT","stim.length":1,"t":[50],"w":[300]}"#)
        .await;
    assert!(!reply.error, "{}", reply.msg);
    assert_eq!(reply.msg["seen"], false);
    assert!(reply.msg["time"].as_u64().unwrap() >= 300);

    session.shutdown().await;
}

#[tokio::test]
async fn test_errors_keep_session_open() {
    let session = Session::bind("127.0.0.1:0", Box::new(MockInstrument::new()))
        .await
        .unwrap();
    let mut client = Client::connect(session.local_addr()).await;

    let reply = client.request("not json").await;
    assert!(reply.error);

    let reply = client.request(r#"{"command":"LAUNCH"}"#).await;
    assert!(reply.error);

    let reply = client
        .request(r#"{"command":"PRESENT","x":0,"y":0,"lum":20,"t":200,"w":1500}"#)
        .await;
    assert!(reply.error, "PRESENT before INITIALIZE must fail");

    let reply = client.request(r#"{"command":"INITIALIZE"}"#).await;
    assert!(!reply.error);

    let reply = client
        .request(r#"{"command":"PRESENT","x":99,"y":0,"lum":20,"t":200,"w":1500}"#)
        .await;
    assert!(reply.error);
    assert!(reply.msg.as_str().unwrap().contains('x'));

    let reply = client
        .request(r#"{"command":"PRESENT","x":0,"y":0,"lum":20,"t":200,"w":1500}"#)
        .await;
    assert!(!reply.error);
    assert_eq!(reply.msg["seen"], true);

    assert_eq!(session.state(), SessionState::Connected);
    session.shutdown().await;
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_relay_forwards_to_downstream_session() {
    let downstream = Session::bind("127.0.0.1:0", Box::new(MockInstrument::new()))
        .await
        .unwrap();
    let port = downstream.local_addr().port();

    let relay = Session::bind("127.0.0.1:0", Box::new(Relay::new(Duration::from_secs(5))))
        .await
        .unwrap();
    let mut client = Client::connect(relay.local_addr()).await;

    let reply = client
        .request(&format!(
            r#"{{"command":"INITIALIZE","ip":"127.0.0.1","port":{port}}}"#
        ))
        .await;
    assert!(!reply.error, "{}", reply.msg);

    let reply = client
        .request(r#"{"command":"PRESENT","x":0,"y":0,"lum":5,"t":200,"w":1500}"#)
        .await;
    assert!(!reply.error);
    assert_eq!(reply.msg["seen"], false);
    assert_eq!(reply.msg["time"], 1500);

    let reply = client.request(r#"{"command":"CLOSE"}"#).await;
    assert!(reply.close);

    relay.closed().await;
    downstream.closed().await;
    assert_eq!(downstream.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let session = Session::bind("127.0.0.1:0", Box::new(MockInstrument::new()))
        .await
        .unwrap();
    let mut client = Client::connect(session.local_addr()).await;
    client.request(r#"{"command":"QUERY"}"#).await;

    session.shutdown().await;
    session.shutdown().await;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(client.reply().await.is_none());
}

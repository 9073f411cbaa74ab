use super::*;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
};
use plotter_core::{
    compile, controller_url, AckTracker, Position, Sequencer, StepCompiler, TransportHandle,
};
use shared::domain::{JogDirection, Polyline};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite::Message as ClientMessage};
use tower::ServiceExt;

fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
        firmware: Firmware::spawn(Duration::from_millis(2)),
        reported_ip: "192.168.4.1".to_string(),
    })
}

async fn serve(state: Arc<AppState>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = build_router(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr.to_string()
}

async fn next_text<S>(reader: &mut S) -> String
where
    S: futures::Stream<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), reader.next())
            .await
            .expect("frame timeout")
            .expect("stream open")
            .expect("frame");
        if let ClientMessage::Text(text) = msg {
            return text;
        }
    }
}

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_router(test_state());
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn state_route_exposes_the_machine_model() {
    let app = build_router(test_state());
    let request = Request::get("/state").body(Body::empty()).expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(json["nonce"], 0);
    assert_eq!(json["pen_down"], false);
}

#[tokio::test]
async fn answers_requests_and_acknowledges_commands() {
    let addr = serve(test_state()).await;
    let (ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("connect");
    let (mut writer, mut reader) = ws.split();

    writer
        .send(ClientMessage::Text("ip".into()))
        .await
        .expect("send ip");
    assert_eq!(next_text(&mut reader).await, "IP: 192.168.4.1");

    writer
        .send(ClientMessage::Text("nonce".into()))
        .await
        .expect("send nonce");
    assert_eq!(next_text(&mut reader).await, "NONCE: 0");

    writer
        .send(ClientMessage::Text("telemetry please".into()))
        .await
        .expect("send junk");
    writer
        .send(ClientMessage::Text("d1100000000000000".into()))
        .await
        .expect("send pen down");
    assert_eq!(next_text(&mut reader).await, "NONCE: 1");
}

#[tokio::test]
async fn sequencer_drives_the_simulator_end_to_end() {
    let state = test_state();
    let addr = serve(Arc::clone(&state)).await;

    let acks = AckTracker::new();
    let transport = Arc::new(TransportHandle::spawn(
        controller_url(&addr).expect("url"),
        Duration::from_millis(100),
        Arc::new(acks.clone()),
    ));
    tokio::time::timeout(Duration::from_secs(2), acks.wait_for_change(None))
        .await
        .expect("initial nonce");
    let sequencer = Sequencer::new(transport, acks.clone());

    sequencer.reset_position(100, 100).await.expect("reset");
    sequencer.jog(JogDirection::PosX, 50).await.expect("jog");
    assert_eq!(sequencer.snapshot().current, Position::at(150, 100));
    assert_eq!(state.firmware.snapshot().await.current, (150, 100));

    let drawing = vec![Polyline::new([(10.4, 10.6), (20.0, 30.0)])];
    assert_eq!(compile(&drawing).len(), 9);
    let steps = StepCompiler::with_settle_delay(10).compile(&drawing);
    sequencer.run(&steps).await.expect("run");

    let machine = state.firmware.snapshot().await;
    assert_eq!(machine.current, (20, 30));
    assert!(!machine.pen_down);
    assert_eq!(machine.moves, 3);
    // reset (3) + jog (3) + drawing (8 wire commands)
    assert_eq!(machine.nonce, 14);
    assert_eq!(acks.current_nonce(), Some(14));
    assert_eq!(sequencer.snapshot().current, Position::at(20, 30));
    assert_eq!(acks.controller_address().as_deref(), Some("192.168.4.1"));
}

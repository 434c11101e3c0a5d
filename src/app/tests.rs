use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::oneshot;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use super::App;
use crate::config::{RunMode, Settings};
use crate::producer::NUMBER_INCREMENTED;
use crate::transport::FallbackHandler;

fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.server.host = "127.0.0.1".to_string();
    settings.server.port = 0;
    settings.producer.interval_ms = 50;
    settings.shutdown.drain_timeout_ms = 2000;
    settings
}

async fn next_json<S>(socket: &mut S) -> Value
where
    S: Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out")
        .expect("socket ended")
        .expect("read failed");
    serde_json::from_str(frame.to_text().unwrap()).unwrap()
}

#[tokio::test]
async fn test_bind_failure_is_reported() {
    let first = App::new(fast_settings())
        .bind(Arc::new(FallbackHandler::new(RunMode::Development)))
        .await
        .unwrap();

    let mut settings = fast_settings();
    settings.server.port = first.local_addr().port();
    let second = App::new(settings)
        .bind(Arc::new(FallbackHandler::new(RunMode::Development)))
        .await;
    assert!(second.is_err());
}

#[tokio::test]
async fn test_runs_and_shuts_down_in_order() {
    let app = App::new(fast_settings());
    let bus = app.bus().clone();
    let counter = app.counter().clone();
    let bound = app
        .bind(Arc::new(FallbackHandler::new(RunMode::Development)))
        .await
        .unwrap();
    let addr = bound.local_addr();

    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(bound.run_until(async {
        let _ = stopped.await;
    }));

    let (mut socket, _) = connect_async(format!("ws://{addr}/api/graphql"))
        .await
        .unwrap();
    socket
        .send(WsMessage::text(json!({ "type": "connection_init" }).to_string()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut socket).await["type"], "connection_ack");

    socket
        .send(WsMessage::text(
            json!({
                "type": "subscribe",
                "id": "1",
                "payload": { "query": "subscription { numberIncremented { currentNumber } }" }
            })
            .to_string(),
        ))
        .await
        .unwrap();

    // consecutive ticks arrive strictly increasing by one
    let first = next_json(&mut socket).await["payload"]["data"]["numberIncremented"]
        ["currentNumber"]
        .as_u64()
        .unwrap();
    let second = next_json(&mut socket).await["payload"]["data"]["numberIncremented"]
        ["currentNumber"]
        .as_u64()
        .unwrap();
    assert!(first >= 1);
    assert_eq!(second, first + 1);

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("shutdown hung")
        .unwrap()
        .unwrap();

    assert!(bus.is_closed());
    assert_eq!(bus.listener_count(NUMBER_INCREMENTED), 0);

    let stopped_at = counter.get();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(counter.get(), stopped_at);
}

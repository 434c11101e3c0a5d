use futures::StreamExt;
use serde_json::json;

use super::{GraphQLRequest, NumberSchema, QueryGateway, build_schema};
use crate::broker::{Event, TopicBus};
use crate::producer::{NUMBER_INCREMENTED, NumberCounter};

const SUBSCRIPTION: &str = "subscription { numberIncremented { currentNumber timestamp } }";

fn schema() -> (TopicBus<Event>, NumberCounter, NumberSchema) {
    let bus = TopicBus::new();
    let counter = NumberCounter::new();
    let schema = build_schema(
        bus.clone(),
        QueryGateway::new(counter.clone()),
        NUMBER_INCREMENTED,
    );
    (bus, counter, schema)
}

#[test]
fn test_gateway_reads_counter() {
    let counter = NumberCounter::new();
    let gateway = QueryGateway::new(counter.clone());
    assert_eq!(gateway.current_number(), 0);
    counter.increment();
    assert_eq!(gateway.current_number(), 1);
}

#[test]
fn test_request_deserializes_apollo_shape() {
    let req: GraphQLRequest = serde_json::from_value(json!({
        "query": "{ currentNumber }",
        "operationName": null,
        "variables": {},
        "extensions": {}
    }))
    .unwrap();
    assert_eq!(req.query, "{ currentNumber }");
    assert_eq!(req.operation_name, None);
}

#[test]
fn test_request_requires_query() {
    let req = serde_json::from_value::<GraphQLRequest>(json!({ "variables": {} }));
    assert!(req.is_err());
}

#[test]
fn test_sdl_declares_both_roots() {
    let (_bus, _counter, schema) = schema();
    let sdl = schema.sdl();
    assert!(sdl.contains("currentNumber: Int!"));
    assert!(sdl.contains("numberIncremented: NumberIncremented!"));
}

#[tokio::test]
async fn test_current_number_query_tracks_counter() {
    let (_bus, counter, schema) = schema();

    let response = schema
        .execute(GraphQLRequest::new("{ currentNumber }"))
        .await;
    assert!(response.is_ok());
    assert_eq!(
        serde_json::to_value(&response.data).unwrap(),
        json!({ "currentNumber": 0 })
    );

    counter.increment();
    counter.increment();
    let response = schema
        .execute(GraphQLRequest::new("{ currentNumber }"))
        .await;
    assert_eq!(
        serde_json::to_value(&response.data).unwrap(),
        json!({ "currentNumber": 2 })
    );
}

#[tokio::test]
async fn test_query_unaffected_by_subscriptions() {
    let (bus, counter, schema) = schema();
    let _listener = bus.subscribe(NUMBER_INCREMENTED);
    counter.increment();

    let response = schema
        .execute(GraphQLRequest::new("{ currentNumber }"))
        .await;
    assert_eq!(
        serde_json::to_value(&response.data).unwrap(),
        json!({ "currentNumber": 1 })
    );
}

#[tokio::test]
async fn test_subscription_streams_published_events() {
    let (bus, _counter, schema) = schema();
    let mut stream = schema
        .execute_stream(GraphQLRequest::new(SUBSCRIPTION))
        .boxed();

    // polling attaches the resolver's listener
    for _ in 0..10 {
        if bus.listener_count(NUMBER_INCREMENTED) == 1 {
            break;
        }
        let _ = futures::poll!(stream.next());
    }
    assert_eq!(bus.listener_count(NUMBER_INCREMENTED), 1);

    bus.publish(
        NUMBER_INCREMENTED,
        Event {
            current_number: 5,
            timestamp: "42".to_string(),
        },
    )
    .unwrap();

    let response = stream.next().await.unwrap();
    assert!(response.is_ok());
    assert_eq!(
        serde_json::to_value(&response.data).unwrap(),
        json!({ "numberIncremented": { "currentNumber": 5, "timestamp": "42" } })
    );

    drop(stream);
    assert_eq!(bus.listener_count(NUMBER_INCREMENTED), 0);
}

#[tokio::test]
async fn test_invalid_subscription_yields_error_response() {
    let (bus, _counter, schema) = schema();
    let mut stream = schema
        .execute_stream(GraphQLRequest::new("subscription { nope }"))
        .boxed();

    let response = stream.next().await.unwrap();
    assert!(response.is_err());
    assert_eq!(bus.listener_count(NUMBER_INCREMENTED), 0);
}

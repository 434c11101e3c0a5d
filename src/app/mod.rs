//! Process wiring: builds the shared pieces from `Settings`, starts the
//! producer and the server, and tears them down in order.
//!
//! Shutdown order:
//! 1. the server stops accepting and drains its connections (every session
//!    releases its listener on the way out),
//! 2. the producer is stopped and awaited,
//! 3. the bus is closed.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::broker::{Event, TopicBus};
use crate::config::Settings;
use crate::graphql::{NumberSchema, QueryGateway, build_schema};
use crate::producer::{EventProducer, NumberCounter};
use crate::transport::{RequestHandler, Server, ServerState};
use crate::utils::error::ServerError;

pub struct App {
    settings: Settings,
    bus: TopicBus<Event>,
    counter: NumberCounter,
    schema: NumberSchema,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        let bus = TopicBus::with_capacity(settings.bus.listener_capacity);
        let counter = NumberCounter::new();
        let schema = build_schema(
            bus.clone(),
            QueryGateway::new(counter.clone()),
            &settings.producer.topic,
        );
        debug!(sdl = %schema.sdl(), "schema built");
        Self {
            settings,
            bus,
            counter,
            schema,
        }
    }

    pub fn bus(&self) -> &TopicBus<Event> {
        &self.bus
    }

    pub fn counter(&self) -> &NumberCounter {
        &self.counter
    }

    /// Bind the listening socket. Nothing runs until `run_until`.
    pub async fn bind(self, handler: Arc<dyn RequestHandler>) -> Result<BoundApp, ServerError> {
        let server = Server::bind(ServerState {
            schema: self.schema.clone(),
            handler,
            settings: self.settings.clone(),
        })
        .await?;
        Ok(BoundApp { app: self, server })
    }
}

pub struct BoundApp {
    app: App,
    server: Server,
}

impl BoundApp {
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Run the producer and the server until `shutdown` resolves, then shut
    /// everything down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        let BoundApp { app, server } = self;

        let producer_token = CancellationToken::new();
        let producer = EventProducer::new(app.bus.clone(), app.counter.clone())
            .with_topic(&app.settings.producer.topic)
            .with_interval(Duration::from_millis(app.settings.producer.interval_ms))
            .spawn(producer_token.clone());

        let result = server.run_until(shutdown).await;

        producer_token.cancel();
        if let Err(e) = producer.await {
            error!(error = %e, "event producer task failed");
        }

        app.bus.close();
        info!(final_number = app.counter.get(), "shutdown complete");
        result
    }
}

#[cfg(test)]
mod tests;

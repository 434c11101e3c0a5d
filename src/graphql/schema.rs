use async_graphql::{Context, EmptyMutation, Object, Result, Schema, SimpleObject, Subscription};
use futures::StreamExt;
use futures::stream::BoxStream;
use tracing::debug;

use crate::broker::{Event, TopicBus};
use crate::graphql::gateway::QueryGateway;

pub type NumberSchema = Schema<QueryRoot, EmptyMutation, SubscriptionRoot>;

/// Topic the `numberIncremented` subscription listens on.
#[derive(Debug, Clone)]
struct IncrementTopic(String);

#[derive(Debug, Clone, PartialEq, Eq, SimpleObject)]
pub struct NumberIncremented {
    pub current_number: u64,
    pub timestamp: String,
}

impl From<&Event> for NumberIncremented {
    fn from(event: &Event) -> Self {
        Self {
            current_number: event.current_number,
            timestamp: event.timestamp.clone(),
        }
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Current value of the counter.
    async fn current_number(&self, ctx: &Context<'_>) -> Result<u64> {
        Ok(ctx.data::<QueryGateway>()?.current_number())
    }
}

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Every counter increment published after the subscription starts.
    async fn number_incremented(
        &self,
        ctx: &Context<'_>,
    ) -> Result<BoxStream<'static, NumberIncremented>> {
        let bus = ctx.data::<TopicBus<Event>>()?;
        let topic = ctx.data::<IncrementTopic>()?;
        let listener = bus.subscribe(&topic.0);
        debug!(topic = %topic.0, listener = listener.id(), "numberIncremented resolver attached");
        Ok(listener
            .map(|event| NumberIncremented::from(event.as_ref()))
            .boxed())
    }
}

/// Build the schema with the bus, the counter gateway and the topic the
/// subscription resolver reads from.
pub fn build_schema(bus: TopicBus<Event>, gateway: QueryGateway, topic: &str) -> NumberSchema {
    Schema::build(QueryRoot, EmptyMutation, SubscriptionRoot)
        .data(bus)
        .data(gateway)
        .data(IncrementTopic(topic.to_string()))
        .finish()
}

use async_graphql::{Request, Variables};
use serde::{Deserialize, Serialize};

/// A GraphQL operation as sent by clients, both in `POST` bodies and in
/// subscribe message payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQLRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<serde_json::Value>,
}

impl GraphQLRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
        }
    }
}

impl From<GraphQLRequest> for Request {
    fn from(req: GraphQLRequest) -> Self {
        let mut request = Request::new(req.query);
        if let Some(name) = req.operation_name {
            request = request.operation_name(name);
        }
        if let Some(variables) = req.variables {
            request = request.variables(Variables::from_json(variables));
        }
        request
    }
}

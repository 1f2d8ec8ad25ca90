//! Request and response frames

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::SealedBody;

/// Methods understood by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Plain key exchange establishing a session
    ExchangeKeys,
    /// Plain liveness check
    Ping,
    /// Latest point per symbol
    GetLatestPrices,
    /// Points in a half-open time range
    GetHistoricalPrices,
}

impl Method {
    /// Every method, in declaration order.
    pub const ALL: [Self; 4] =
        [Self::ExchangeKeys, Self::Ping, Self::GetLatestPrices, Self::GetHistoricalPrices];

    /// Wire name of the method.
    pub const fn name(self) -> &'static str {
        match self {
            Self::ExchangeKeys => "exchangeKeys",
            Self::Ping => "ping",
            Self::GetLatestPrices => "getLatestPrices",
            Self::GetHistoricalPrices => "getHistoricalPrices",
        }
    }

    /// Look up a method by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    /// Whether the body must be sealed by the channel codec.
    pub const fn is_sealed(self) -> bool {
        matches!(self, Self::GetLatestPrices | Self::GetHistoricalPrices)
    }
}

/// Message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Body {
    /// Unencrypted JSON (handshake, ping, plain errors)
    Plain(Value),
    /// Output of the channel codec
    Sealed(SealedBody),
    /// Generic rejection carrying no detail
    Rejected(String),
}

impl Body {
    /// Text of every rejection sent to a peer.
    pub const REJECTED: &'static str = "request rejected";

    /// The generic rejection body.
    pub fn rejected() -> Self {
        Self::Rejected(Self::REJECTED.to_string())
    }
}

/// Client to server frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Correlation identifier, unique per connection
    pub id: u64,
    /// Wire method name
    pub method: String,
    /// Claimed client identity, required for sealed methods
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Request body
    pub body: Body,
}

/// Server to client frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Identifier of the request being answered
    pub id: u64,
    /// Response body
    pub body: Body,
}

impl Response {
    /// Generic rejection for request `id`.
    pub fn rejected(id: u64) -> Self {
        Self { id, body: Body::rejected() }
    }
}

/// Inner object of a sealed request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Must equal the outer request id
    pub id: u64,
    /// Must equal the outer method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
}

/// Inner object of a sealed response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// Must equal the outer response id
    pub id: u64,
    /// Handler result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Business error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallResponse {
    /// Successful result.
    pub fn ok(id: u64, result: Value) -> Self {
        Self { id, result: Some(result), error: None }
    }

    /// Business error.
    pub fn err(id: u64, error: impl Into<String>) -> Self {
        Self { id, result: None, error: Some(error.into()) }
    }

    /// Convert into the handler outcome. A response with neither field is
    /// treated as a null result.
    pub fn into_result(self) -> Result<Value, String> {
        match (self.error, self.result) {
            (Some(error), _) => Err(error),
            (None, result) => Ok(result.unwrap_or(Value::Null)),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn method_names_roundtrip() {
        for method in Method::ALL {
            assert_eq!(Method::from_name(method.name()), Some(method));
        }
        assert_eq!(Method::from_name("getPrices"), None);
    }

    #[test]
    fn only_price_methods_are_sealed() {
        assert!(!Method::ExchangeKeys.is_sealed());
        assert!(!Method::Ping.is_sealed());
        assert!(Method::GetLatestPrices.is_sealed());
        assert!(Method::GetHistoricalPrices.is_sealed());
    }

    #[test]
    fn rejected_response_shape() {
        let json = serde_json::to_value(Response::rejected(7)).unwrap();
        assert_eq!(json, json!({"id": 7, "body": {"rejected": "request rejected"}}));
    }

    #[test]
    fn request_omits_missing_client_id() {
        let request = Request {
            id: 1,
            method: Method::Ping.name().to_string(),
            client_id: None,
            body: Body::Plain(Value::Null),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("clientId").is_none());
        assert_eq!(json["body"], json!({"plain": null}));
    }

    #[test]
    fn call_response_error_wins() {
        let response = CallResponse { id: 1, result: Some(json!(1)), error: Some("boom".into()) };
        assert_eq!(response.into_result(), Err("boom".to_string()));
        assert_eq!(CallResponse::ok(2, json!({"a": 1})).into_result(), Ok(json!({"a": 1})));
    }
}

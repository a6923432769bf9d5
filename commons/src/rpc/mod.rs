use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Protocol version stamped on every envelope. MUST be exactly "1.0".
pub const JSONRPC_VERSION: &str = "1.0";

/// The JSON-RPC request envelope published to the broker.
///
/// Trace identifiers are attached after construction via
/// [`RpcRequest::with_trace`]; the untraced original is never published.
/// Absent optional fields are omitted from the wire format entirely, while
/// `params` is always emitted (`{}` when empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Globally unique request identifier, assigned exactly once at creation.
    pub id: String,
    /// Name of the invoked method. Non-blank by caller contract, enforced at
    /// the trigger boundary.
    pub method: String,
    #[serde(default)]
    pub params: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl RpcRequest {
    /// Build an untraced request with defaults applied: protocol version
    /// "1.0", timestamp now.
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        params: Map<String, Value>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
            timestamp: Utc::now(),
            trace_id: None,
            span_id: None,
        }
    }

    /// Return a traced copy of this request. The receiver is left untouched.
    pub fn with_trace(&self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            span_id: Some(span_id.into()),
            ..self.clone()
        }
    }
}

/// The error object carried in a response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn parse_error() -> Self {
        Self::new(-32700, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(-32600, "Invalid Request")
    }

    pub fn method_not_found() -> Self {
        Self::new(-32601, "Method not found")
    }

    pub fn invalid_params() -> Self {
        Self::new(-32602, "Invalid params")
    }

    pub fn internal_error() -> Self {
        Self::new(-32603, "Internal error")
    }

    /// Arbitrary application error code.
    pub fn server_error(code: i32, message: impl Into<String>) -> Self {
        Self::new(code, message)
    }
}

/// The response envelope produced by the consumer side.
///
/// Carries exactly one of `result` or `error`; the constructors below are the
/// only way to build one. Nothing in the producer publishes responses, the
/// shape is the wire contract for consumers of this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

impl RpcResponse {
    pub fn success(id: impl Into<String>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: Some(result),
            error: None,
            timestamp: Utc::now(),
            trace_id: None,
            span_id: None,
        }
    }

    pub fn error(id: impl Into<String>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            result: None,
            error: Some(error),
            timestamp: Utc::now(),
            trace_id: None,
            span_id: None,
        }
    }

    /// Return a traced copy of this response. The receiver is left untouched.
    pub fn with_trace(&self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            span_id: Some(span_id.into()),
            ..self.clone()
        }
    }
}

//! Wire envelopes exchanged over a connection.
//!
//! Inbound: `{"group", "method", "params", "id"}`.
//! Outbound: `{"success", "response", "id"}` where a failed `response` is
//! `{"errors": [{"code", "message"}]}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{ChatterError, ErrorCodeStyle};

/// Sent if serializing a response ever fails.
const ENCODE_FALLBACK: &str =
    r#"{"success":false,"response":{"errors":[{"code":0,"message":"Exception"}]},"id":null}"#;

/// Inbound request from a client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Command group (e.g. `user`).
    pub group: String,
    /// Command method within the group (e.g. `auth`).
    pub method: String,
    /// Named parameters. Always an object after [`Request::decode`].
    #[serde(default)]
    pub params: Value,
    /// Correlation token echoed back in the reply.
    #[serde(default)]
    pub id: Value,
}

/// A request that could not be decoded.
#[derive(Debug)]
pub struct DecodeFailure {
    /// Correlation id, when the message was valid JSON carrying one.
    pub id: Value,
    /// The decode error.
    pub error: ChatterError,
}

impl Request {
    /// Build a request with object params.
    pub fn new(
        group: impl Into<String>,
        method: impl Into<String>,
        params: Value,
        id: Value,
    ) -> Self {
        Self {
            group: group.into(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Decode a raw text frame.
    ///
    /// Invalid JSON yields a failure with a null id. Valid JSON with the
    /// wrong shape keeps whatever `id` it carried so the reply can still be
    /// correlated.
    pub fn decode(raw: &str) -> Result<Self, DecodeFailure> {
        let value: Value = serde_json::from_str(raw).map_err(|e| DecodeFailure {
            id: Value::Null,
            error: ChatterError::Decode { reason: e.to_string() },
        })?;
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        let mut request: Self = serde_json::from_value(value).map_err(|e| DecodeFailure {
            id: id.clone(),
            error: ChatterError::Decode { reason: e.to_string() },
        })?;

        match request.params {
            Value::Null => request.params = Value::Object(Map::new()),
            Value::Object(_) => {}
            _ => {
                return Err(DecodeFailure {
                    id,
                    error: ChatterError::Decode {
                        reason: "params must be an object".into(),
                    },
                });
            }
        }
        Ok(request)
    }

    /// Serialize for sending.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// `group.method` label used in logs and metrics.
    pub fn command_name(&self) -> String {
        format!("{}.{}", self.group, self.method)
    }
}

/// One entry in a failed response's `errors` list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Wire error code.
    pub code: i64,
    /// Client-visible message.
    pub message: String,
}

/// Body of a pushed event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// `group.method` of the event.
    pub event: String,
    /// Payload supplied by the emitter.
    pub params: Value,
    /// Correlation data stored with the subscription, null for direct emits.
    pub data: Value,
}

/// Outbound reply or event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the call succeeded.
    pub success: bool,
    /// Result payload, or `{"errors": [...]}` on failure.
    pub response: Value,
    /// Echoed correlation token.
    pub id: Value,
}

impl Response {
    /// Successful reply.
    pub fn ok(id: Value, response: Value) -> Self {
        Self {
            success: true,
            response,
            id,
        }
    }

    /// Failed reply carrying the given entries.
    pub fn failure(id: Value, errors: Vec<ErrorEntry>) -> Self {
        Self {
            success: false,
            response: serde_json::json!({ "errors": errors }),
            id,
        }
    }

    /// Failed reply for a single error.
    pub fn from_error(id: Value, error: &ChatterError, style: ErrorCodeStyle) -> Self {
        Self::failure(id, vec![error.to_entry(style)])
    }

    /// Event delivery addressed to a subscription callback.
    pub fn event(callback: Value, payload: &EventPayload) -> Self {
        Self {
            success: true,
            response: serde_json::json!({
                "event": payload.event,
                "params": payload.params,
                "data": payload.data,
            }),
            id: callback,
        }
    }

    /// Serialize for sending.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| ENCODE_FALLBACK.to_owned())
    }

    /// Error entries of a failed reply.
    pub fn errors(&self) -> Vec<ErrorEntry> {
        self.response
            .get("errors")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decode_full_request() {
        let raw = r#"{"group":"user","method":"auth","params":{"username":"alice","password":"x"},"id":1}"#;
        let req = Request::decode(raw).unwrap();
        assert_eq!(req.group, "user");
        assert_eq!(req.method, "auth");
        assert_eq!(req.params["username"], "alice");
        assert_eq!(req.id, json!(1));
        assert_eq!(req.command_name(), "user.auth");
    }

    #[test]
    fn decode_missing_params_yields_empty_object() {
        let req = Request::decode(r#"{"group":"chat","method":"users","id":"a"}"#).unwrap();
        assert_eq!(req.params, json!({}));
    }

    #[test]
    fn decode_missing_id_is_null() {
        let req = Request::decode(r#"{"group":"chat","method":"users","params":{}}"#).unwrap();
        assert!(req.id.is_null());
    }

    #[test]
    fn decode_invalid_json_has_null_id() {
        let err = Request::decode("{not json").unwrap_err();
        assert!(err.id.is_null());
        assert_matches!(err.error, ChatterError::Decode { .. });
    }

    #[test]
    fn decode_wrong_shape_keeps_id() {
        let err = Request::decode(r#"{"method":"auth","id":7}"#).unwrap_err();
        assert_eq!(err.id, json!(7));
        assert_matches!(err.error, ChatterError::Decode { .. });
    }

    #[test]
    fn decode_rejects_non_object_params() {
        let err = Request::decode(r#"{"group":"a","method":"b","params":[1],"id":2}"#).unwrap_err();
        assert_eq!(err.id, json!(2));
    }

    #[test]
    fn decode_non_object_message() {
        let err = Request::decode("[1,2,3]").unwrap_err();
        assert!(err.id.is_null());
    }

    #[test]
    fn ok_response_shape() {
        let resp = Response::ok(json!(1), json!({}));
        insta::assert_json_snapshot!(resp, @r#"
        {
          "success": true,
          "response": {},
          "id": 1
        }
        "#);
    }

    #[test]
    fn error_response_shape() {
        let err = ChatterError::DuplicateIdentity { identity: "alice".into() };
        let resp = Response::from_error(json!(1), &err, ErrorCodeStyle::Legacy);
        insta::assert_json_snapshot!(resp, @r#"
        {
          "success": false,
          "response": {
            "errors": [
              {
                "code": 0,
                "message": "Only one username connection is allowed"
              }
            ]
          },
          "id": 1
        }
        "#);
    }

    #[test]
    fn event_response_carries_payload_and_callback() {
        let payload = EventPayload {
            event: "chat.message".into(),
            params: json!({"user": "alice", "message": "hi"}),
            data: json!({"room": "lobby"}),
        };
        let resp = Response::event(json!(3), &payload);
        assert!(resp.success);
        assert_eq!(resp.id, json!(3));
        assert_eq!(resp.response["event"], "chat.message");
        assert_eq!(resp.response["params"]["user"], "alice");
        assert_eq!(resp.response["data"]["room"], "lobby");
    }

    #[test]
    fn errors_accessor() {
        let resp = Response::from_error(
            json!(null),
            &ChatterError::access_denied(),
            ErrorCodeStyle::Distinct,
        );
        let errors = resp.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code, 2);
        assert_eq!(errors[0].message, "Access denied");
        assert!(Response::ok(json!(1), json!({})).errors().is_empty());
    }

    #[test]
    fn encode_is_valid_json() {
        let resp = Response::ok(json!("x"), json!({"a": [1, 2]}));
        let back: Response = serde_json::from_str(&resp.encode()).unwrap();
        assert_eq!(back, resp);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn encode_decode_preserves_request(
                group in "[a-z_]{1,12}",
                method in "[a-z_]{1,12}",
                key in "[a-z]{1,8}",
                val in any::<i64>(),
                id in any::<u32>(),
            ) {
                let req = Request::new(group, method, json!({ key: val }), json!(id));
                let back = Request::decode(&req.encode()).unwrap();
                prop_assert_eq!(back, req);
            }

            #[test]
            fn arbitrary_text_never_panics(raw in ".{0,64}") {
                let _ = Request::decode(&raw);
            }
        }
    }
}

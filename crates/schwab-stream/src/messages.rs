//! Wire messages for the streaming protocol.
//!
//! Outbound frames are `{"requests": [...]}` envelopes. Inbound frames are a
//! JSON object carrying exactly one of `notify`, `response` or `data`;
//! [`ProtocolMessage::classify`] turns a text frame into the matching variant.

use std::fmt;

use schwab_core::logging::redact;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::StreamError;
use crate::preferences::StreamerSessionInfo;

/// Subscription key for account activity.
pub const ACCOUNT_ACTIVITY_KEY: &str = "Account Activity";

/// Field list requested on the account subscription.
pub const ACCOUNT_ACTIVITY_FIELDS: &str = "0,1,2,3";

// ─────────────────────────────────────────────────────────────────────────────
// Services and commands
// ─────────────────────────────────────────────────────────────────────────────

/// Streaming service a frame is addressed to or came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Service {
    /// Control plane: login and logout.
    Admin,
    /// Account and order activity.
    Account,
    /// Anything else the server may name.
    Other(String),
}

impl Service {
    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Admin => "ADMIN",
            Self::Account => "ACCT_ACTIVITY",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for Service {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "ADMIN" => Self::Admin,
            "ACCT_ACTIVITY" | "ACCOUNT" => Self::Account,
            _ => Self::Other(value),
        }
    }
}

impl From<Service> for String {
    fn from(value: Service) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// Open the session.
    Login,
    /// Close the session.
    Logout,
    /// Subscribe, replacing any existing subscription.
    Subs,
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Command parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RequestParameters {
    /// Parameters of an `ADMIN/LOGIN` request.
    Login {
        /// Bearer token without scheme.
        #[serde(rename = "Authorization")]
        authorization: String,
        /// Client channel.
        #[serde(rename = "SchwabClientChannel")]
        channel: String,
        /// Client function id.
        #[serde(rename = "SchwabClientFunctionId")]
        function_id: String,
    },
    /// Parameters of a `SUBS` request.
    Subscribe {
        /// Subscription keys.
        keys: String,
        /// Requested fields.
        fields: String,
    },
}

/// One outbound request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamRequest {
    /// Sequence number, as a string.
    #[serde(rename = "requestid")]
    pub request_id: String,
    /// Target service.
    pub service: Service,
    /// Command.
    pub command: Command,
    /// Customer id from the streamer info.
    #[serde(rename = "SchwabClientCustomerId")]
    pub customer_id: String,
    /// Correlation id from the streamer info.
    #[serde(rename = "SchwabClientCorrelId")]
    pub correl_id: String,
    /// Command parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<RequestParameters>,
}

impl StreamRequest {
    fn new(id: u64, service: Service, command: Command, info: &StreamerSessionInfo) -> Self {
        Self {
            request_id: id.to_string(),
            service,
            command,
            customer_id: info.schwab_client_customer_id.clone(),
            correl_id: info.schwab_client_correl_id.clone(),
            parameters: None,
        }
    }

    /// `ADMIN/LOGIN` with the given bearer token.
    pub fn admin_login(id: u64, info: &StreamerSessionInfo, access_token: &str) -> Self {
        Self {
            parameters: Some(RequestParameters::Login {
                authorization: access_token.to_string(),
                channel: info.schwab_client_channel.clone(),
                function_id: info.schwab_client_function_id.clone(),
            }),
            ..Self::new(id, Service::Admin, Command::Login, info)
        }
    }

    /// `ADMIN/LOGOUT`.
    pub fn admin_logout(id: u64, info: &StreamerSessionInfo) -> Self {
        Self::new(id, Service::Admin, Command::Logout, info)
    }

    /// Account activity subscription.
    pub fn account_subscribe(id: u64, info: &StreamerSessionInfo) -> Self {
        Self {
            parameters: Some(RequestParameters::Subscribe {
                keys: ACCOUNT_ACTIVITY_KEY.to_string(),
                fields: ACCOUNT_ACTIVITY_FIELDS.to_string(),
            }),
            ..Self::new(id, Service::Account, Command::Subs, info)
        }
    }

    /// Copy with the login token masked, for logging.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if let Some(RequestParameters::Login { authorization, .. }) = &mut copy.parameters {
            *authorization = redact(authorization);
        }
        copy
    }
}

/// Outbound envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamRequests {
    /// Requests carried by this frame.
    pub requests: Vec<StreamRequest>,
}

impl StreamRequests {
    /// Envelope around a single request.
    pub fn single(request: StreamRequest) -> Self {
        Self {
            requests: vec![request],
        }
    }

    /// Serialize to frame text.
    pub fn to_text(&self) -> Result<String, StreamError> {
        serde_json::to_string(self).map_err(|e| StreamError::Encode(e.to_string()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Heartbeat frame.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct NotifyMessage {
    /// Raw notify entries.
    #[serde(default)]
    pub notify: Vec<Value>,
}

/// Result carried by a service response.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ResponseContent {
    /// Result code; 0 is success.
    pub code: i64,
    /// Result message.
    #[serde(default, alias = "msg")]
    pub message: String,
}

/// One per-service response.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServiceResponse {
    /// Responding service.
    pub service: Service,
    /// Echoed command.
    #[serde(default)]
    pub command: Option<String>,
    /// Echoed request id.
    #[serde(default, rename = "requestid")]
    pub request_id: Option<String>,
    /// Server timestamp, epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Result.
    pub content: ResponseContent,
}

/// Frame of command responses.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ResponseMessage {
    /// Responses carried by this frame.
    pub response: Vec<ServiceResponse>,
}

/// Per-service data payload. Items stay raw until the service is known.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ServiceData {
    /// Publishing service.
    pub service: Service,
    /// Server timestamp, epoch milliseconds.
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Command the data belongs to.
    #[serde(default)]
    pub command: Option<String>,
    /// Content items, in order.
    #[serde(default)]
    pub content: Vec<Value>,
}

/// Frame of streamed data.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DataMessage {
    /// Payloads carried by this frame.
    pub data: Vec<ServiceData>,
}

/// One account activity item.
///
/// Fields `1`, `2` and `3` carry the account, the message type and the message
/// body; anything else is kept in `extra`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AccountContent {
    /// Sequence number of the item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<i64>,
    /// Subscription key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Account number.
    #[serde(rename = "1", default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Message type, e.g. `OrderCreated`.
    #[serde(rename = "2", default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,
    /// Message body, usually JSON text.
    #[serde(rename = "3", default, skip_serializing_if = "Option::is_none")]
    pub message_data: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An inbound frame.
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolMessage {
    /// Heartbeat.
    Notify(NotifyMessage),
    /// Command responses.
    Response(ResponseMessage),
    /// Streamed data.
    Data(DataMessage),
}

impl ProtocolMessage {
    /// Classify and parse a text frame by its top-level key.
    pub fn classify(text: &str) -> Result<Self, StreamError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| StreamError::decode("stream frame", &e))?;
        let Value::Object(object) = &value else {
            return Err(StreamError::Decode {
                context: "stream frame",
                message: "frame is not a JSON object".into(),
            });
        };

        if object.contains_key("notify") {
            serde_json::from_value(value)
                .map(Self::Notify)
                .map_err(|e| StreamError::decode("notify frame", &e))
        } else if object.contains_key("response") {
            serde_json::from_value(value)
                .map(Self::Response)
                .map_err(|e| StreamError::decode("response frame", &e))
        } else if object.contains_key("data") {
            serde_json::from_value(value)
                .map(Self::Data)
                .map_err(|e| StreamError::decode("data frame", &e))
        } else {
            Err(StreamError::Decode {
                context: "stream frame",
                message: "expected one of notify, response or data".into(),
            })
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn info() -> StreamerSessionInfo {
        StreamerSessionInfo {
            streamer_socket_url: "wss://streamer.example.com/ws".into(),
            schwab_client_customer_id: "CUST".into(),
            schwab_client_correl_id: "CORR".into(),
            schwab_client_channel: "N9".into(),
            schwab_client_function_id: "APIAPP".into(),
        }
    }

    #[test]
    fn login_frame_shape() {
        let frame = StreamRequests::single(StreamRequest::admin_login(0, &info(), "tok"));
        let value: Value = serde_json::from_str(&frame.to_text().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"requests": [{
                "requestid": "0",
                "service": "ADMIN",
                "command": "LOGIN",
                "SchwabClientCustomerId": "CUST",
                "SchwabClientCorrelId": "CORR",
                "parameters": {
                    "Authorization": "tok",
                    "SchwabClientChannel": "N9",
                    "SchwabClientFunctionId": "APIAPP"
                }
            }]})
        );
    }

    #[test]
    fn subscribe_and_logout_frame_shapes() {
        let subs = serde_json::to_value(StreamRequest::account_subscribe(1, &info())).unwrap();
        assert_eq!(subs["service"], "ACCT_ACTIVITY");
        assert_eq!(subs["command"], "SUBS");
        assert_eq!(subs["parameters"], json!({"keys": "Account Activity", "fields": "0,1,2,3"}));

        let logout = serde_json::to_value(StreamRequest::admin_logout(2, &info())).unwrap();
        assert_eq!(logout["command"], "LOGOUT");
        assert!(logout.get("parameters").is_none());
    }

    #[test]
    fn redacted_login_masks_token() {
        let request = StreamRequest::admin_login(0, &info(), "very-secret-token");
        let masked = request.redacted();
        assert_matches!(
            masked.parameters,
            Some(RequestParameters::Login { ref authorization, .. }) if authorization == "***oken"
        );
    }

    #[test]
    fn service_names() {
        assert_eq!(Service::from("ACCOUNT".to_string()), Service::Account);
        assert_eq!(Service::from("acct_activity".to_string()), Service::Account);
        assert_eq!(Service::from("ADMIN".to_string()), Service::Admin);
        assert_eq!(
            Service::from("LEVELONE_EQUITIES".to_string()),
            Service::Other("LEVELONE_EQUITIES".into())
        );
    }

    #[test]
    fn classify_notify() {
        let msg = ProtocolMessage::classify(r#"{"notify":[{"heartbeat":"1700000000000"}]}"#).unwrap();
        assert_matches!(msg, ProtocolMessage::Notify(n) if n.notify.len() == 1);
    }

    #[test]
    fn classify_response_accepts_msg_alias() {
        let msg = ProtocolMessage::classify(
            r#"{"response":[{"service":"ADMIN","command":"LOGIN","requestid":"0","content":{"code":0,"msg":"server=s0635dc6-1;status=PN"}}]}"#,
        )
        .unwrap();
        let ProtocolMessage::Response(response) = msg else {
            panic!("expected response");
        };
        assert_eq!(response.response[0].service, Service::Admin);
        assert_eq!(response.response[0].content.code, 0);
        assert_eq!(response.response[0].content.message, "server=s0635dc6-1;status=PN");
    }

    #[test]
    fn classify_data_keeps_item_order() {
        let msg = ProtocolMessage::classify(
            r#"{"data":[{"service":"ACCT_ACTIVITY","timestamp":1,"command":"SUBS","content":[{"seq":1,"key":"Account Activity","1":"ACC","2":"OrderCreated","3":"{}"},{"seq":2}]}]}"#,
        )
        .unwrap();
        let ProtocolMessage::Data(data) = msg else {
            panic!("expected data");
        };
        assert_eq!(data.data[0].service, Service::Account);
        let items: Vec<AccountContent> = data.data[0]
            .content
            .iter()
            .map(|v| serde_json::from_value(v.clone()).unwrap())
            .collect();
        assert_eq!(items[0].message_type.as_deref(), Some("OrderCreated"));
        assert_eq!(items[1].seq, Some(2));
    }

    #[test]
    fn outbound_frame_is_rejected_as_inbound() {
        let text = StreamRequests::single(StreamRequest::admin_login(0, &info(), "tok"))
            .to_text()
            .unwrap();
        assert_matches!(ProtocolMessage::classify(&text), Err(StreamError::Decode { .. }));
    }

    #[test]
    fn non_object_and_invalid_json_are_decode_errors() {
        assert_matches!(ProtocolMessage::classify("[1,2]"), Err(StreamError::Decode { .. }));
        assert_matches!(ProtocolMessage::classify("not json"), Err(StreamError::Decode { .. }));
        assert_matches!(
            ProtocolMessage::classify(r#"{"response": 5}"#),
            Err(StreamError::Decode { context: "response frame", .. })
        );
    }

    #[test]
    fn response_without_result_code_is_decode_error() {
        assert_matches!(
            ProtocolMessage::classify(r#"{"response":[{"service":"ADMIN","command":"LOGIN"}]}"#),
            Err(StreamError::Decode { context: "response frame", .. })
        );
        assert_matches!(
            ProtocolMessage::classify(r#"{"response":[{"service":"ADMIN","content":{"msg":"ok"}}]}"#),
            Err(StreamError::Decode { context: "response frame", .. })
        );
    }

    #[test]
    fn account_content_keeps_unknown_fields() {
        let item: AccountContent = serde_json::from_value(json!({"seq": 3, "4": "x"})).unwrap();
        assert_eq!(item.extra.get("4"), Some(&json!("x")));
    }
}

use log::{ debug, warn };
use serde::Serialize;
use serde_json::Value;

/// How outbound text is put on the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum FrameFormat {
    /// The message text as-is.
    #[default]
    Text,
    /// `{"action":"sendMessage","message":...}` for route-selecting gateways.
    Json,
}

#[derive(Serialize, Debug)]
#[serde(tag = "action")]
pub enum ClientFrame<'a> {
    #[serde(rename = "sendMessage")] SendMessage {
        message: &'a str,
    },
}

pub fn encode_outbound(text: &str, format: FrameFormat) -> String {
    match format {
        FrameFormat::Text => text.to_string(),
        FrameFormat::Json => {
            let frame = ClientFrame::SendMessage { message: text };
            // Serializing a single borrowed string field cannot fail.
            serde_json::to_string(&frame).unwrap_or_else(|_| text.to_string())
        }
    }
}

/// Turns an inbound payload into the text shown to the user.
///
/// A JSON object carrying a string `response` field yields that field; anything
/// else (invalid JSON, other shapes, non-string `response`) yields the payload
/// verbatim. This never fails.
pub fn decode_response(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(map)) => {
            if let Some(Value::String(response)) = map.get("response") {
                return response.clone();
            }
            if let Some(Value::String(error)) = map.get("error") {
                warn!("Server reported an error: {}", error);
            } else {
                debug!("Inbound object has no string 'response' field, using raw payload");
            }
            payload.to_string()
        }
        Ok(_) => {
            debug!("Inbound JSON is not an object, using raw payload");
            payload.to_string()
        }
        Err(e) => {
            debug!("Inbound frame is not JSON ({}), using raw payload", e);
            payload.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structured_response_is_unwrapped() {
        assert_eq!(decode_response(r#"{"response":"hello!"}"#), "hello!");
        assert_eq!(decode_response(r#"{"response":"","citations":[]}"#), "");
    }

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(decode_response("just words"), "just words");
        assert_eq!(decode_response(""), "");
    }

    #[test]
    fn other_json_shapes_pass_through_verbatim() {
        let cases = [
            r#"{"error":"Received empty or unusable query."}"#,
            r#"{"response":42}"#,
            r#"{"response":null}"#,
            r#"["response"]"#,
            r#""response""#,
            "17",
            r#"{"response":"unterminated"#,
        ];
        for case in cases {
            assert_eq!(decode_response(case), case);
        }
    }

    #[test]
    fn outbound_text_is_raw() {
        assert_eq!(encode_outbound("plan a trip", FrameFormat::Text), "plan a trip");
    }

    #[test]
    fn outbound_json_uses_send_message_envelope() {
        let encoded = encode_outbound("say \"hi\"", FrameFormat::Json);
        let value: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(value["action"], "sendMessage");
        assert_eq!(value["message"], "say \"hi\"");
    }
}

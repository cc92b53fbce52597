use serde::Serialize;

/// Preview push, in the envelope the host's web client already listens for.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutedMessage<'a> {
    #[serde(rename = "type")]
    pub msg_type: &'static str,
    pub data: ExecutedData<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutedData<'a> {
    pub node: &'a str,
    pub output: PreviewOutput,
    pub prompt_id: Option<String>,
}

/// One base64 PNG per image; compare mode sends two, with `null` for a side
/// that failed to encode.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewOutput {
    pub ram_preview: Vec<Option<String>>,
}

impl<'a> ExecutedMessage<'a> {
    pub fn new(node: &'a str, ram_preview: Vec<Option<String>>) -> Self {
        Self {
            msg_type: "executed",
            data: ExecutedData {
                node,
                output: PreviewOutput { ram_preview },
                prompt_id: None,
            },
        }
    }
}

/// Body of every control-route response and WebSocket reply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReply {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StatusReply {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            reason: None,
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            status: "error",
            reason: Some(reason.into()),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"status":"error"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn executed_message_shape() {
        let msg = ExecutedMessage::new("12", vec![Some("abc".into())]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "executed",
                "data": {
                    "node": "12",
                    "output": { "ram_preview": ["abc"] },
                    "prompt_id": null
                }
            })
        );
    }

    #[test]
    fn compare_failure_side_is_null() {
        let msg = ExecutedMessage::new("n", vec![Some("a".into()), None]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["data"]["output"]["ram_preview"], json!(["a", null]));
    }

    #[test]
    fn status_reply_json() {
        assert_eq!(StatusReply::ok().to_json(), r#"{"status":"ok"}"#);
        assert_eq!(
            StatusReply::error("node_id missing").to_json(),
            r#"{"status":"error","reason":"node_id missing"}"#
        );
    }
}

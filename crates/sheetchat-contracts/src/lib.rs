use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const SERVICE_NAME: &str = "sheetchat";

pub const DEFAULT_SESSION_ID: &str = "default";

pub const APOLOGY_MESSAGE: &str =
    "Lo siento, ocurrió un problema al procesar tu mensaje. Inténtalo de nuevo en unos minutos.";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Count,
    List,
    MostRecent,
    ExecutiveSummary,
    Unclassified,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Count => "count",
            Intent::List => "list",
            Intent::MostRecent => "most_recent",
            Intent::ExecutiveSummary => "executive_summary",
            Intent::Unclassified => "unclassified",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationTurn {
    pub user_message: String,
    pub assistant_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(alias = "texto", alias = "mensaje")]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

pub fn session_key(session_id: Option<&str>) -> &str {
    match session_id {
        Some(v) if !v.trim().is_empty() => v,
        _ => DEFAULT_SESSION_ID,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatResponse {
    #[serde(rename = "respuesta")]
    pub response: String,
}

impl ChatResponse {
    pub fn apology() -> Self {
        Self {
            response: APOLOGY_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    pub status: String,
    pub service: String,
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            service: SERVICE_NAME.to_string(),
        }
    }
}

pub fn error_body(code: &str, message: &str) -> Value {
    json!({"error": {"code": code, "message": message}})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_accepts_spanish_field_aliases() {
        let req: ChatRequest = serde_json::from_str(r#"{"texto":"hola"}"#).unwrap();
        assert_eq!(req.message, "hola");
        assert_eq!(session_key(req.session_id.as_deref()), DEFAULT_SESSION_ID);

        let req: ChatRequest =
            serde_json::from_str(r#"{"mensaje":"hola","session_id":"abc"}"#).unwrap();
        assert_eq!(session_key(req.session_id.as_deref()), "abc");
    }

    #[test]
    fn blank_session_id_falls_back_to_default() {
        assert_eq!(session_key(Some("  ")), DEFAULT_SESSION_ID);
        assert_eq!(session_key(None), DEFAULT_SESSION_ID);
    }

    #[test]
    fn chat_response_uses_respuesta_field() {
        let v = serde_json::to_value(ChatResponse::apology()).unwrap();
        assert_eq!(v, json!({"respuesta": APOLOGY_MESSAGE}));
    }

    #[test]
    fn intent_serializes_snake_case() {
        let v = serde_json::to_value(Intent::ExecutiveSummary).unwrap();
        assert_eq!(v, json!("executive_summary"));
        assert_eq!(Intent::MostRecent.as_str(), "most_recent");
    }
}

mod extract;
mod llm;
mod snapshot;
mod tabular;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use sheetchat_config::{Config, Limits, SheetEntry};
use sheetchat_contracts::{
    error_body, session_key, ChatRequest, ChatResponse, ConversationTurn, HealthStatus,
};
use sheetchat_kernel::{
    filter_rows, render_rows, sample_context, ConversationMemory, PromptBuilder,
    PromptContext, Row, RuleEngine, RuleOutcome, SheetProfile, Snapshot,
};
use thiserror::Error;
use tokio::sync::Mutex;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub use extract::{classify_media_type, Attachment, AttachmentKind, ExtractError};
pub use llm::{GeminiClient, LanguageModel, LlmError, MediaPart};
pub use snapshot::{FetchError, HttpSheetSource, SheetSource, SnapshotCache};
pub use tabular::{parse_csv, parse_jotform, parse_workbook};

const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

pub async fn serve(cfg: Config) -> Result<(), String> {
    let addr: SocketAddr = cfg
        .server
        .listen_addr
        .parse()
        .map_err(|e| format!("invalid listen_addr: {e}"))?;

    let app = build_app(cfg)?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind failed: {e}"))?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("serve failed: {e}"))
}

pub fn build_app(cfg: Config) -> Result<Router, String> {
    let model = GeminiClient::new(
        cfg.model.api_key.clone(),
        cfg.model.model.clone(),
        cfg.model.base_url.clone(),
    );
    let source = HttpSheetSource::new(Duration::from_secs(cfg.sheets.fetch_timeout_secs))?;
    Ok(build_app_with(cfg, Arc::new(model), Arc::new(source)))
}

pub fn build_app_with(
    cfg: Config,
    model: Arc<dyn LanguageModel>,
    source: Arc<dyn SheetSource>,
) -> Router {
    let state = AppState::new(cfg, model, source);
    Router::new()
        .route("/", get(healthz))
        .route("/healthz", get(healthz))
        .route("/chat", post(chat))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("{0}")]
    BadRequest(String),
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),
    #[error("attachment extraction failed: {0}")]
    Extraction(#[from] ExtractError),
    #[error("language model call failed: {0}")]
    Model(#[from] LlmError),
}

impl ChatError {
    fn client_code(&self) -> Option<&'static str> {
        match self {
            ChatError::BadRequest(_) => Some("validation_error"),
            ChatError::UnsupportedMedia(_) => Some("unsupported_media_type"),
            _ => None,
        }
    }
}

struct ChatInput {
    message: String,
    session_id: Option<String>,
    attachment: Option<Attachment>,
}

#[derive(Clone)]
struct AppState {
    limits: Limits,
    snapshots: Arc<SnapshotCache>,
    memory: Arc<Mutex<ConversationMemory>>,
    rules: Arc<RuleEngine>,
    prompts: Arc<PromptBuilder>,
    model: Arc<dyn LanguageModel>,
}

impl AppState {
    fn new(cfg: Config, model: Arc<dyn LanguageModel>, source: Arc<dyn SheetSource>) -> Self {
        let profiles = cfg.sheets.catalog.iter().map(sheet_profile).collect();
        Self {
            snapshots: Arc::new(SnapshotCache::new(
                source,
                cfg.sheets.catalog.clone(),
                Duration::from_secs(cfg.sheets.cache_ttl_secs),
            )),
            memory: Arc::new(Mutex::new(ConversationMemory::new(
                cfg.limits.history_turns,
            ))),
            rules: Arc::new(RuleEngine::new(profiles)),
            prompts: Arc::new(PromptBuilder::new(cfg.limits.max_document_chars)),
            model,
            limits: cfg.limits,
        }
    }

    async fn process_chat(&self, input: ChatInput) -> Result<String, ChatError> {
        let message = input.message.trim().to_string();
        if message.is_empty() && input.attachment.is_none() {
            return Err(ChatError::BadRequest("message is required".to_string()));
        }
        let session = session_key(input.session_id.as_deref()).to_string();
        let history = { self.memory.lock().await.history(&session) };

        let (context, media) = match input.attachment {
            Some(attachment) => self.attachment_context(attachment, &message)?,
            None => {
                let snapshot = self.snapshots.get_snapshot().await;
                match self.rules.evaluate(&message, &snapshot) {
                    RuleOutcome::Answered { intent, answer } => {
                        info!(intent = intent.as_str(), session = %session, "answered by rule");
                        let reply = answer.render();
                        self.remember(&session, &message, &reply).await;
                        return Ok(reply);
                    }
                    RuleOutcome::Declined => (self.sheet_context(&message, &snapshot), None),
                }
            }
        };

        let prompt = self.prompts.build(&history, &context, &message);
        let reply = self.model.generate(&prompt, media.as_ref()).await?;
        self.remember(&session, &message, &reply).await;
        Ok(reply)
    }

    fn attachment_context(
        &self,
        attachment: Attachment,
        message: &str,
    ) -> Result<(PromptContext, Option<MediaPart>), ChatError> {
        let media_type = attachment.effective_media_type();
        let kind = classify_media_type(&media_type)
            .ok_or_else(|| ChatError::UnsupportedMedia(media_type.clone()))?;
        info!(file = %attachment.file_name, media_type = %media_type, ?kind, "attachment received");

        let context = match kind {
            AttachmentKind::Pdf => PromptContext::Document {
                name: attachment.file_name,
                text: extract::extract_pdf(&attachment.bytes)?,
            },
            AttachmentKind::Word => PromptContext::Document {
                name: attachment.file_name,
                text: extract::extract_docx(&attachment.bytes)?,
            },
            AttachmentKind::Csv | AttachmentKind::Workbook => {
                let table = extract::read_spreadsheet(kind, &attachment.bytes)?;
                PromptContext::Spreadsheet {
                    name: attachment.file_name,
                    preview: extract::spreadsheet_preview(
                        &table,
                        message,
                        self.limits.max_context_rows,
                    ),
                }
            }
            AttachmentKind::Media => {
                return Ok((
                    PromptContext::None,
                    Some(MediaPart {
                        mime_type: media_type,
                        data: attachment.bytes,
                    }),
                ));
            }
        };
        Ok((context, None))
    }

    fn sheet_context(&self, message: &str, snapshot: &Snapshot) -> PromptContext {
        if snapshot.is_empty() {
            return PromptContext::None;
        }
        let limit = self.limits.max_context_rows;

        if let Some(profile) = self.rules.detect_sheet(message) {
            if let Some(table) = snapshot.table(&profile.name) {
                let rows = filter_rows(&table.rows, message, limit);
                if !rows.is_empty() {
                    return PromptContext::Rows {
                        source: profile.display_name().to_string(),
                        text: render_rows(&rows),
                    };
                }
            }
        }

        let mut sources = Vec::new();
        let mut matched: Vec<&Row> = Vec::new();
        for (name, table) in snapshot.sheets() {
            if matched.len() >= limit {
                break;
            }
            let rows = filter_rows(&table.rows, message, limit - matched.len());
            if !rows.is_empty() {
                sources.push(name.to_string());
                matched.extend(rows);
            }
        }
        if !matched.is_empty() {
            return PromptContext::Rows {
                source: sources.join(", "),
                text: render_rows(&matched),
            };
        }

        let sample = sample_context(snapshot, self.limits.sample_rows);
        if sample.is_empty() {
            warn!("no sheet data available for prompt context");
            return PromptContext::None;
        }
        PromptContext::Rows {
            source: "todas las planillas".to_string(),
            text: sample,
        }
    }

    async fn remember(&self, session: &str, message: &str, reply: &str) {
        let mut memory = self.memory.lock().await;
        memory.record(
            session,
            ConversationTurn {
                user_message: message.to_string(),
                assistant_message: reply.to_string(),
            },
        );
    }
}

fn sheet_profile(entry: &SheetEntry) -> SheetProfile {
    SheetProfile {
        name: entry.name.clone(),
        label: entry.label.clone(),
        synonyms: entry.synonyms.clone(),
        date_column: entry.date_column.clone(),
        rework_column: entry.rework_column.clone(),
        rework_values: entry.rework_values.clone(),
        duration_column: entry.duration_column.clone(),
    }
}

async fn healthz() -> Json<HealthStatus> {
    Json(HealthStatus::default())
}

async fn chat(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<ChatResponse>, (StatusCode, Json<Value>)> {
    let input = decode_chat(&state, req).await.map_err(client_error)?;
    match state.process_chat(input).await {
        Ok(response) => Ok(Json(ChatResponse { response })),
        Err(e) if e.client_code().is_some() => Err(client_error(e)),
        Err(e) => {
            error!(err = %e, "chat request failed");
            Ok(Json(ChatResponse::apology()))
        }
    }
}

fn client_error(e: ChatError) -> (StatusCode, Json<Value>) {
    let code = e.client_code().unwrap_or("validation_error");
    (
        StatusCode::BAD_REQUEST,
        Json(error_body(code, &e.to_string())),
    )
}

async fn decode_chat(state: &AppState, req: Request) -> Result<ChatInput, ChatError> {
    let content_type = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_lowercase();

    if !content_type.starts_with("multipart/form-data") {
        let Json(body) = Json::<ChatRequest>::from_request(req, state)
            .await
            .map_err(|e| ChatError::BadRequest(e.body_text()))?;
        return Ok(ChatInput {
            message: body.message,
            session_id: body.session_id,
            attachment: None,
        });
    }

    let mut multipart = Multipart::from_request(req, state)
        .await
        .map_err(|e| ChatError::BadRequest(e.body_text()))?;
    let mut input = ChatInput {
        message: String::new(),
        session_id: None,
        attachment: None,
    };
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ChatError::BadRequest(e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" | "texto" | "mensaje" => {
                input.message = field
                    .text()
                    .await
                    .map_err(|e| ChatError::BadRequest(e.body_text()))?;
            }
            "session_id" => {
                input.session_id = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ChatError::BadRequest(e.body_text()))?,
                );
            }
            "file" | "archivo" => {
                let file_name = field.file_name().unwrap_or("adjunto").to_string();
                let media_type = field.content_type().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ChatError::BadRequest(e.body_text()))?;
                if !bytes.is_empty() {
                    input.attachment = Some(Attachment {
                        file_name,
                        media_type,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            _ => {}
        }
    }
    Ok(input)
}

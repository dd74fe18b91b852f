use sheetchat_contracts::ConversationTurn;

use crate::filter::render_rows;
use crate::{Row, Snapshot};

const DEFAULT_INSTRUCTIONS: &str = "Eres un asistente que responde en español usando solo el \
contexto entregado. Si el contexto no contiene la respuesta, dilo con claridad.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptContext {
    None,
    Rows { source: String, text: String },
    Document { name: String, text: String },
    Spreadsheet { name: String, preview: String },
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_document_chars: usize,
}

impl PromptBuilder {
    pub fn new(max_document_chars: usize) -> Self {
        Self { max_document_chars }
    }

    pub fn build(
        &self,
        history: &[ConversationTurn],
        context: &PromptContext,
        message: &str,
    ) -> String {
        let mut sections = vec![DEFAULT_INSTRUCTIONS.to_string()];

        if !history.is_empty() {
            let turns: Vec<String> = history
                .iter()
                .map(|t| {
                    format!(
                        "Usuario: {}\nAsistente: {}",
                        t.user_message, t.assistant_message
                    )
                })
                .collect();
            sections.push(format!(
                "### Historial de la conversación\n{}",
                turns.join("\n")
            ));
        }

        match context {
            PromptContext::None => {}
            PromptContext::Rows { source, text } => {
                sections.push(format!("### Datos de {source}\n{text}"));
            }
            PromptContext::Document { name, text } => {
                sections.push(format!(
                    "### Documento adjunto: {name}\n{}",
                    truncate_chars(text, self.max_document_chars)
                ));
            }
            PromptContext::Spreadsheet { name, preview } => {
                sections.push(format!("### Planilla adjunta: {name}\n{preview}"));
            }
        }

        sections.push(format!("### Pregunta del usuario\n{}", message.trim()));
        sections.join("\n\n")
    }
}

pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

pub fn sample_context(snapshot: &Snapshot, rows_per_sheet: usize) -> String {
    snapshot
        .sheets()
        .filter(|(_, table)| !table.is_empty())
        .map(|(name, table)| {
            let sample: Vec<&Row> = table.rows.iter().take(rows_per_sheet).collect();
            format!(
                "{name} ({} registros, columnas: {}):\n{}",
                table.len(),
                table.columns.join(", "),
                render_rows(&sample)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

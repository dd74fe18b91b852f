use std::io::{Cursor, Read};

use regex::Regex;
use sheetchat_kernel::{filter_rows, render_rows, Row, Table};
use thiserror::Error;

use crate::tabular::{parse_csv, parse_workbook};

const DOCX_MEDIA_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const XLSX_MEDIA_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("pdf: {0}")]
    Pdf(String),
    #[error("word: {0}")]
    Word(String),
    #[error("spreadsheet: {0}")]
    Spreadsheet(String),
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Pdf,
    Word,
    Csv,
    Workbook,
    Media,
}

impl Attachment {
    fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default()
    }

    // Windows browsers label .csv uploads as application/vnd.ms-excel.
    pub fn effective_media_type(&self) -> String {
        let declared = self
            .media_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        let extension = self.extension();
        let generic = declared.is_empty() || declared == "application/octet-stream";
        let excel_labelled_csv = extension == "csv"
            && matches!(
                classify_media_type(&declared),
                Some(AttachmentKind::Workbook)
            );
        if !generic && !excel_labelled_csv {
            return declared;
        }
        match extension.as_str() {
            "pdf" => "application/pdf".to_string(),
            "docx" => DOCX_MEDIA_TYPE.to_string(),
            "csv" => "text/csv".to_string(),
            "xlsx" => XLSX_MEDIA_TYPE.to_string(),
            "xls" => "application/vnd.ms-excel".to_string(),
            "png" => "image/png".to_string(),
            "jpg" | "jpeg" => "image/jpeg".to_string(),
            "mp4" => "video/mp4".to_string(),
            _ => declared,
        }
    }
}

pub fn classify_media_type(media_type: &str) -> Option<AttachmentKind> {
    match media_type {
        "application/pdf" => Some(AttachmentKind::Pdf),
        DOCX_MEDIA_TYPE => Some(AttachmentKind::Word),
        "text/csv" | "application/csv" => Some(AttachmentKind::Csv),
        XLSX_MEDIA_TYPE | "application/vnd.ms-excel" => Some(AttachmentKind::Workbook),
        t if t.starts_with("image/") || t.starts_with("video/") => Some(AttachmentKind::Media),
        _ => None,
    }
}

// pdf-extract panics on some malformed documents; those become errors too.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractError::Pdf("malformed document".to_string()))?
        .map_err(|e| ExtractError::Pdf(format!("{e:?}")))
}

pub fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Word(e.to_string()))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Word(e.to_string()))?
        .read_to_string(&mut xml)
        .map_err(|e| ExtractError::Word(e.to_string()))?;
    docx_text(&xml)
}

fn docx_text(xml: &str) -> Result<String, ExtractError> {
    let runs = Regex::new(r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>|</w:p>|<w:tab/>|<w:br/>")
        .map_err(|e| ExtractError::Word(e.to_string()))?;
    let mut out = String::new();
    for caps in runs.captures_iter(xml) {
        match caps.get(1) {
            Some(text) => out.push_str(&unescape_xml(text.as_str())),
            None => match &caps[0] {
                "<w:tab/>" => out.push('\t'),
                _ => out.push('\n'),
            },
        }
    }
    Ok(out.trim().to_string())
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn read_spreadsheet(kind: AttachmentKind, bytes: &[u8]) -> Result<Table, ExtractError> {
    match kind {
        AttachmentKind::Csv => parse_csv(bytes).map_err(ExtractError::Spreadsheet),
        _ => parse_workbook(bytes).map_err(ExtractError::Spreadsheet),
    }
}

pub fn spreadsheet_preview(table: &Table, message: &str, max_rows: usize) -> String {
    let mut rows = filter_rows(&table.rows, message, max_rows);
    if rows.is_empty() {
        rows = table.rows.iter().take(max_rows).collect::<Vec<&Row>>();
    }
    format!(
        "Columnas: {}\nFilas totales: {}\n{}",
        table.columns.join(", "),
        table.len(),
        render_rows(&rows)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            writer
                .start_file(
                    "word/document.xml",
                    zip::write::SimpleFileOptions::default(),
                )
                .unwrap();
            writer.write_all(document_xml.as_bytes()).unwrap();
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    fn kind_of(name: &str, media_type: &str) -> Option<AttachmentKind> {
        let attachment = Attachment {
            file_name: name.to_string(),
            media_type: media_type.to_string(),
            bytes: vec![],
        };
        classify_media_type(&attachment.effective_media_type())
    }

    #[test]
    fn classifies_declared_media_types() {
        assert_eq!(
            kind_of("a", "application/pdf"),
            Some(AttachmentKind::Pdf)
        );
        assert_eq!(
            kind_of("a", "text/csv; charset=utf-8"),
            Some(AttachmentKind::Csv)
        );
        assert_eq!(
            kind_of("a", "IMAGE/JPEG"),
            Some(AttachmentKind::Media)
        );
        assert_eq!(kind_of("a.zip", "application/zip"), None);
    }

    #[test]
    fn octet_stream_falls_back_to_extension() {
        assert_eq!(
            kind_of("informe.DOCX", "application/octet-stream"),
            Some(AttachmentKind::Word)
        );
        assert_eq!(kind_of("datos.bin", ""), None);
    }

    #[test]
    fn csv_labelled_as_excel_is_csv() {
        assert_eq!(
            kind_of("turnos.csv", "application/vnd.ms-excel"),
            Some(AttachmentKind::Csv)
        );
        assert_eq!(
            kind_of("turnos.xls", "application/vnd.ms-excel"),
            Some(AttachmentKind::Workbook)
        );
        assert_eq!(kind_of("turnos.csv", "application/pdf"), Some(AttachmentKind::Pdf));
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>Informe</w:t></w:r><w:r><w:t xml:space="preserve"> de turno</w:t></w:r></w:p>
            <w:p><w:r><w:t>Torno &amp; prensa</w:t><w:tab/><w:t>ok</w:t></w:r></w:p>
        </w:body></w:document>"#;
        let text = extract_docx(&docx_bytes(xml)).unwrap();
        assert_eq!(text, "Informe de turno\nTorno & prensa\tok");
    }

    #[test]
    fn broken_docx_is_an_error() {
        assert!(matches!(
            extract_docx(b"not a zip"),
            Err(ExtractError::Word(_))
        ));
    }

    #[test]
    fn preview_prefers_matching_rows() {
        let table = parse_csv(b"Equipo,Estado\nTorno,ok\nPrensa,falla\nFresa,ok\n").unwrap();
        let preview = spreadsheet_preview(&table, "que pasa con la prensa", 5);
        assert!(preview.starts_with("Columnas: Equipo, Estado\nFilas totales: 3\n"));
        assert!(preview.contains("Equipo: Prensa | Estado: falla"));
        assert!(!preview.contains("Torno"));

        let generic = spreadsheet_preview(&table, "hola", 2);
        assert!(generic.contains("Torno"));
        assert!(generic.contains("Prensa"));
        assert!(!generic.contains("Fresa"));
    }
}

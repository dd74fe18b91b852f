use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader};
use serde_json::Value;
use sheetchat_kernel::Table;

pub fn parse_csv(bytes: &[u8]) -> Result<Table, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(bytes);
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| format!("csv header parse failed: {e}"))?
        .iter()
        .enumerate()
        .map(|(idx, h)| {
            let h = if idx == 0 {
                h.trim_start_matches('\u{feff}')
            } else {
                h
            };
            if h.trim().is_empty() {
                format!("columna_{}", idx + 1)
            } else {
                h.to_string()
            }
        })
        .collect();

    let mut records = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("csv record {} parse failed: {e}", idx + 1))?;
        records.push(record.iter().map(|v| v.to_string()).collect());
    }
    Ok(Table::from_records(columns, records))
}

pub fn parse_workbook(bytes: &[u8]) -> Result<Table, String> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
        .map_err(|e| format!("workbook open failed: {e}"))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| "workbook has no sheets".to_string())?
        .map_err(|e| format!("worksheet read failed: {e}"))?;

    let mut rows = range.rows();
    let columns: Vec<String> = rows
        .next()
        .map(|header| {
            header
                .iter()
                .enumerate()
                .map(|(idx, cell)| {
                    let name = cell.to_string();
                    if name.trim().is_empty() {
                        format!("columna_{}", idx + 1)
                    } else {
                        name
                    }
                })
                .collect()
        })
        .unwrap_or_default();
    let records = rows
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();
    Ok(Table::from_records(columns, records))
}

pub fn parse_jotform(body: &Value) -> Result<Table, String> {
    let submissions = body
        .get("content")
        .and_then(|v| v.as_array())
        .ok_or_else(|| "jotform response has no content array".to_string())?;

    let mut columns = vec!["id".to_string(), "created_at".to_string()];
    let mut parsed: Vec<Vec<(String, String)>> = Vec::new();
    for submission in submissions {
        let mut cells = vec![
            ("id".to_string(), scalar_text(submission.get("id"))),
            (
                "created_at".to_string(),
                scalar_text(submission.get("created_at")),
            ),
        ];
        if let Some(answers) = submission.get("answers").and_then(|v| v.as_object()) {
            let mut ordered: Vec<(&String, &Value)> = answers.iter().collect();
            ordered.sort_by_key(|(key, _)| key.parse::<u64>().unwrap_or(u64::MAX));
            for (key, answer) in ordered {
                let Some(value) = answer.get("answer") else {
                    continue;
                };
                let label = answer
                    .get("text")
                    .and_then(|v| v.as_str())
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| v.trim().to_string())
                    .unwrap_or_else(|| format!("pregunta_{key}"));
                if !columns.contains(&label) {
                    columns.push(label.clone());
                }
                cells.push((label, answer_text(value)));
            }
        }
        parsed.push(cells);
    }

    let records = parsed
        .into_iter()
        .map(|cells| {
            columns
                .iter()
                .map(|c| {
                    cells
                        .iter()
                        .find(|(label, _)| label == c)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect();
    Ok(Table::from_records(columns, records))
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn answer_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .map(answer_text)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(map) => map
            .values()
            .map(answer_text)
            .filter(|v| !v.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

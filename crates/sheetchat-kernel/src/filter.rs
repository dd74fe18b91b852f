use std::collections::HashSet;

use crate::normalize::{normalize, tokens};
use crate::Row;

pub const STOP_WORDS: &[&str] = &[
    "que", "para", "con", "los", "las", "del", "una", "uno", "unos", "unas", "por", "como",
    "cual", "cuales", "cuantos", "cuantas", "cuanto", "cuanta", "hay", "son", "esta", "este",
    "estos", "estas", "ese", "esa", "eso", "esos", "esas", "sobre", "tiene", "tienen", "dame",
    "dime", "muestra", "muestrame", "mostrar", "quiero", "saber", "todos", "todas", "cuando",
    "donde", "mas", "pero", "sus", "mis", "tus", "ser", "fue", "han", "hubo", "entre", "desde",
    "hasta", "segun", "puedes", "podrias", "favor", "informacion", "datos", "the", "and", "what",
    "how", "many", "show",
];

pub fn keywords(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokens(query)
        .into_iter()
        .filter(|t| t.chars().count() > 2)
        .filter(|t| !STOP_WORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn is_numeric(token: &str) -> bool {
    token.chars().all(|c| c.is_ascii_digit())
}

// Number of keywords found in the row. Numbers must match a whole cell word,
// everything else matches as a substring.
pub fn score_row(row: &Row, keywords: &[String]) -> usize {
    let haystack = normalize(&row.joined());
    if haystack.is_empty() {
        return 0;
    }
    let words: HashSet<&str> = haystack.split(' ').collect();
    keywords
        .iter()
        .filter(|k| {
            if is_numeric(k) {
                words.contains(k.as_str())
            } else {
                haystack.contains(k.as_str())
            }
        })
        .count()
}

pub fn filter_rows<'a>(rows: &'a [Row], query: &str, limit: usize) -> Vec<&'a Row> {
    let keywords = keywords(query);
    if keywords.is_empty() {
        return Vec::new();
    }
    let mut scored: Vec<(usize, &Row)> = rows
        .iter()
        .map(|row| (score_row(row, &keywords), row))
        .filter(|(score, _)| *score > 0)
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, row)| row).collect()
}

pub fn render_rows(rows: &[&Row]) -> String {
    rows.iter()
        .map(|row| {
            let cells: Vec<String> = row
                .cells()
                .iter()
                .filter(|(_, v)| !v.trim().is_empty())
                .map(|(c, v)| format!("{c}: {}", v.trim()))
                .collect();
            format!("- {}", cells.join(" | "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use sheetchat_contracts::Intent;

use crate::filter::render_rows;
use crate::intent::IntentClassifier;
use crate::normalize::normalize;
use crate::sheets::{detect_sheet, SheetProfile};
use crate::{Row, Snapshot, Table};

pub const LIST_LIMIT: usize = 10;

const MIN_FILTER_VALUE_CHARS: usize = 3;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%d.%m.%Y"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFilter {
    pub column: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutiveSummary {
    pub sheet: String,
    pub total: usize,
    pub rework: usize,
    pub duration_total: f64,
    pub rework_pct: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Answer {
    Count {
        sheet: String,
        count: usize,
        filters: Vec<ColumnFilter>,
    },
    MostRecent {
        sheet: String,
        row: Option<Row>,
    },
    List {
        sheet: String,
        rows: Vec<Row>,
        total: usize,
    },
    ExecutiveSummary(ExecutiveSummary),
}

// `Declined` means no rule applies and the caller should ask the model.
// A zero count is still `Answered`.
#[derive(Debug, Clone, PartialEq)]
pub enum RuleOutcome {
    Declined,
    Answered { intent: Intent, answer: Answer },
}

impl Answer {
    pub fn render(&self) -> String {
        match self {
            Answer::Count {
                sheet,
                count,
                filters,
            } => {
                let noun = if *count == 1 { "registro" } else { "registros" };
                if filters.is_empty() {
                    format!("Hay {count} {noun} en {sheet}.")
                } else {
                    let conditions: Vec<String> = filters
                        .iter()
                        .map(|f| format!("{} = {}", f.column, f.value))
                        .collect();
                    format!(
                        "Hay {count} {noun} en {sheet} con {}.",
                        conditions.join(", ")
                    )
                }
            }
            Answer::MostRecent { sheet, row } => match row {
                Some(row) => format!(
                    "El registro más reciente en {sheet} es:\n{}",
                    render_rows(&[row])
                ),
                None => format!("No hay registros en {sheet}."),
            },
            Answer::List { sheet, rows, total } => {
                if rows.is_empty() {
                    return format!("No encontré registros en {sheet} con esos criterios.");
                }
                let refs: Vec<&Row> = rows.iter().collect();
                format!(
                    "Registros de {sheet} (mostrando {} de {total}):\n{}",
                    rows.len(),
                    render_rows(&refs)
                )
            }
            Answer::ExecutiveSummary(s) => format!(
                "Resumen ejecutivo: {}\n\
                 - Total de registros: {}\n\
                 - Registros con retrabajo: {}\n\
                 - Porcentaje de retrabajo: {:.1}%\n\
                 - Duración total: {:.1}",
                s.sheet, s.total, s.rework, s.rework_pct, s.duration_total
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuleEngine {
    classifier: IntentClassifier,
    profiles: Vec<SheetProfile>,
}

impl RuleEngine {
    pub fn new(profiles: Vec<SheetProfile>) -> Self {
        Self {
            classifier: IntentClassifier::default(),
            profiles,
        }
    }

    pub fn detect_sheet(&self, query: &str) -> Option<&SheetProfile> {
        detect_sheet(query, &self.profiles)
    }

    pub fn evaluate(&self, query: &str, snapshot: &Snapshot) -> RuleOutcome {
        let intent = self.classifier.classify(query);
        if intent == Intent::Unclassified {
            return RuleOutcome::Declined;
        }
        let Some(profile) = self.detect_sheet(query) else {
            return RuleOutcome::Declined;
        };
        let Some(table) = snapshot.table(&profile.name) else {
            return RuleOutcome::Declined;
        };
        let sheet = profile.display_name().to_string();

        let answer = match intent {
            Intent::Count => {
                let filters = detect_filters(table, query);
                let count = apply_filters(&table.rows, &filters).len();
                Answer::Count {
                    sheet,
                    count,
                    filters,
                }
            }
            Intent::MostRecent => {
                let Some(column) = profile.date_column.as_deref() else {
                    return RuleOutcome::Declined;
                };
                let filters = detect_filters(table, query);
                let rows = apply_filters(&table.rows, &filters);
                Answer::MostRecent {
                    sheet,
                    row: most_recent(&rows, column).cloned(),
                }
            }
            Intent::List => {
                let filters = detect_filters(table, query);
                let rows = apply_filters(&table.rows, &filters);
                Answer::List {
                    sheet,
                    total: rows.len(),
                    rows: rows.into_iter().take(LIST_LIMIT).cloned().collect(),
                }
            }
            Intent::ExecutiveSummary => Answer::ExecutiveSummary(executive_summary(profile, table)),
            Intent::Unclassified => return RuleOutcome::Declined,
        };
        RuleOutcome::Answered { intent, answer }
    }
}

pub fn detect_filters(table: &Table, query: &str) -> Vec<ColumnFilter> {
    let lowered = query.to_lowercase();
    let mut filters = Vec::new();
    for column in &table.columns {
        let mut seen = HashSet::new();
        for row in &table.rows {
            let Some(value) = row.get(column) else {
                continue;
            };
            let value = value.trim();
            if value.chars().count() < MIN_FILTER_VALUE_CHARS {
                continue;
            }
            let key = value.to_lowercase();
            if lowered.contains(&key) && seen.insert(key) {
                filters.push(ColumnFilter {
                    column: column.clone(),
                    value: value.to_string(),
                });
            }
        }
    }
    filters
}

// Values for the same column are alternatives; different columns must all
// match.
pub fn apply_filters<'a>(rows: &'a [Row], filters: &[ColumnFilter]) -> Vec<&'a Row> {
    let mut by_column: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for f in filters {
        by_column
            .entry(f.column.as_str())
            .or_default()
            .push(f.value.to_lowercase());
    }
    rows.iter()
        .filter(|row| {
            by_column.iter().all(|(column, values)| {
                row.get(column)
                    .map(|v| values.contains(&v.trim().to_lowercase()))
                    .unwrap_or(false)
            })
        })
        .collect()
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or_default();
    if date_part.is_empty() {
        return None;
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

pub fn most_recent<'a>(rows: &[&'a Row], column: &str) -> Option<&'a Row> {
    let mut dated: Vec<(Option<NaiveDate>, &'a Row)> = rows
        .iter()
        .map(|row| (row.get(column).and_then(parse_date), *row))
        .collect();
    dated.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    dated.first().map(|(_, row)| *row)
}

pub fn parse_number(raw: &str) -> Option<f64> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }
    let cleaned = match (compact.rfind(','), compact.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => compact.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => compact.replace(',', ""),
        (Some(_), None) => compact.replace(',', "."),
        _ => compact,
    };
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn executive_summary(profile: &SheetProfile, table: &Table) -> ExecutiveSummary {
    let flags: HashSet<String> = profile.rework_values.iter().map(|v| normalize(v)).collect();
    let total = table.len();
    let rework = match profile.rework_column.as_deref() {
        Some(column) => table
            .rows
            .iter()
            .filter(|row| {
                row.get(column)
                    .map(|v| flags.contains(&normalize(v)))
                    .unwrap_or(false)
            })
            .count(),
        None => 0,
    };
    let duration_total = match profile.duration_column.as_deref() {
        Some(column) => table
            .rows
            .iter()
            .filter_map(|row| row.get(column).and_then(parse_number))
            .sum(),
        None => 0.0,
    };
    let rework_pct = if total == 0 {
        0.0
    } else {
        rework as f64 / total as f64 * 100.0
    };
    ExecutiveSummary {
        sheet: profile.display_name().to_string(),
        total,
        rework,
        duration_total,
        rework_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> Table {
        Table::from_records(
            vec![
                "Fecha".to_string(),
                "Equipo".to_string(),
                "Planta".to_string(),
                "Retrabajo".to_string(),
                "Horas".to_string(),
            ],
            vec![
                vec!["2024-03-01", "Torno", "Norte", "Sí", "2,5"],
                vec!["15/04/2024", "Compresor", "Sur", "no", "1.5"],
                vec!["sin fecha", "Torno", "Sur", "no", "abc"],
                vec!["2024-02-10", "Prensa", "Norte", "si", "4"],
            ]
            .into_iter()
            .map(|r| r.into_iter().map(|v| v.to_string()).collect())
            .collect(),
        )
    }

    fn profile() -> SheetProfile {
        SheetProfile {
            label: Some("Mantenimientos".to_string()),
            date_column: Some("Fecha".to_string()),
            rework_column: Some("Retrabajo".to_string()),
            rework_values: vec!["si".to_string(), "sí".to_string()],
            duration_column: Some("Horas".to_string()),
            ..SheetProfile::named("mantenimientos")
        }
    }

    fn engine_and_snapshot() -> (RuleEngine, Snapshot) {
        (
            RuleEngine::new(vec![profile()]),
            Snapshot::new(vec![("mantenimientos".to_string(), table())]),
        )
    }

    #[test]
    fn count_without_filters_uses_all_rows() {
        let (engine, snapshot) = engine_and_snapshot();
        match engine.evaluate("cuántos mantenimientos hay", &snapshot) {
            RuleOutcome::Answered {
                intent: Intent::Count,
                answer: Answer::Count { count, filters, .. },
            } => {
                assert_eq!(count, 4);
                assert!(filters.is_empty());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn count_applies_detected_column_filters() {
        let (engine, snapshot) = engine_and_snapshot();
        let outcome = engine.evaluate("cuantos mantenimientos del torno en planta sur", &snapshot);
        let RuleOutcome::Answered { answer, .. } = outcome else {
            panic!("expected an answer");
        };
        assert_eq!(
            answer,
            Answer::Count {
                sheet: "Mantenimientos".to_string(),
                count: 1,
                filters: vec![
                    ColumnFilter {
                        column: "Equipo".to_string(),
                        value: "Torno".to_string()
                    },
                    ColumnFilter {
                        column: "Planta".to_string(),
                        value: "Sur".to_string()
                    },
                ],
            }
        );
    }

    #[test]
    fn zero_rows_is_an_answer_not_a_decline() {
        let engine = RuleEngine::new(vec![profile()]);
        let snapshot = Snapshot::new(vec![("mantenimientos".to_string(), Table::default())]);
        let outcome = engine.evaluate("cuántos mantenimientos hay", &snapshot);
        assert!(matches!(
            outcome,
            RuleOutcome::Answered {
                answer: Answer::Count { count: 0, .. },
                ..
            }
        ));
    }

    #[test]
    fn declines_without_sheet_or_intent() {
        let (engine, snapshot) = engine_and_snapshot();
        assert_eq!(
            engine.evaluate("cuántos clientes hay", &snapshot),
            RuleOutcome::Declined
        );
        assert_eq!(
            engine.evaluate("háblame de los mantenimientos", &snapshot),
            RuleOutcome::Declined
        );
        assert_eq!(
            engine.evaluate("cuántos mantenimientos hay", &Snapshot::default()),
            RuleOutcome::Declined
        );
    }

    #[test]
    fn most_recent_sorts_unparseable_dates_last() {
        let (engine, snapshot) = engine_and_snapshot();
        let RuleOutcome::Answered {
            answer: Answer::MostRecent { row: Some(row), .. },
            ..
        } = engine.evaluate("¿cuál fue el último mantenimiento?", &snapshot)
        else {
            panic!("expected most recent row");
        };
        assert_eq!(row.get("Equipo"), Some("Compresor"));

        let t = table();
        let only_undated: Vec<&Row> = t.rows.iter().filter(|r| r.get("Fecha") == Some("sin fecha")).collect();
        assert_eq!(most_recent(&only_undated, "Fecha").and_then(|r| r.get("Equipo")), Some("Torno"));
    }

    #[test]
    fn most_recent_declines_without_date_column() {
        let engine = RuleEngine::new(vec![SheetProfile::named("mantenimientos")]);
        let snapshot = Snapshot::new(vec![("mantenimientos".to_string(), table())]);
        assert_eq!(
            engine.evaluate("último mantenimiento", &snapshot),
            RuleOutcome::Declined
        );
    }

    #[test]
    fn list_caps_rows_and_reports_total() {
        let columns = vec!["Equipo".to_string()];
        let records = (0..15).map(|i| vec![format!("equipo {i}")]).collect();
        let engine = RuleEngine::new(vec![SheetProfile::named("equipos")]);
        let snapshot = Snapshot::new(vec![(
            "equipos".to_string(),
            Table::from_records(columns, records),
        )]);
        let RuleOutcome::Answered {
            answer: Answer::List { rows, total, .. },
            ..
        } = engine.evaluate("lista de equipos", &snapshot)
        else {
            panic!("expected list");
        };
        assert_eq!(rows.len(), LIST_LIMIT);
        assert_eq!(total, 15);
    }

    #[test]
    fn executive_summary_ignores_filters() {
        let (engine, snapshot) = engine_and_snapshot();
        let RuleOutcome::Answered {
            answer: Answer::ExecutiveSummary(summary),
            ..
        } = engine.evaluate("resumen ejecutivo de mantenimientos del torno", &snapshot)
        else {
            panic!("expected summary");
        };
        assert_eq!(summary.total, 4);
        assert_eq!(summary.rework, 2);
        assert!((summary.duration_total - 8.0).abs() < 1e-9);
        assert!((summary.rework_pct - 50.0).abs() < 1e-9);
        assert!(Answer::ExecutiveSummary(summary)
            .render()
            .contains("Porcentaje de retrabajo: 50.0%"));
    }

    #[test]
    fn executive_summary_of_empty_sheet_has_zero_percentage() {
        let summary = executive_summary(&profile(), &Table::default());
        assert_eq!(summary.total, 0);
        assert_eq!(summary.rework_pct, 0.0);
    }

    #[test]
    fn parses_common_date_and_number_forms() {
        assert_eq!(parse_date("2024-05-06"), NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(parse_date("06/05/2024 10:22:00"), NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(parse_date("2024-05-06T08:00:00Z"), NaiveDate::from_ymd_opt(2024, 5, 6));
        assert_eq!(parse_date("ayer"), None);
        assert_eq!(parse_number("1.234,5"), Some(1234.5));
        assert_eq!(parse_number("1,234.5"), Some(1234.5));
        assert_eq!(parse_number("2,5"), Some(2.5));
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn count_render_mentions_filters() {
        let answer = Answer::Count {
            sheet: "Mantenimientos".to_string(),
            count: 1,
            filters: vec![ColumnFilter {
                column: "Planta".to_string(),
                value: "Sur".to_string(),
            }],
        };
        assert_eq!(
            answer.render(),
            "Hay 1 registro en Mantenimientos con Planta = Sur."
        );
    }
}

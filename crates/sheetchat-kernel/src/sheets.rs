use crate::normalize::normalize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetProfile {
    pub name: String,
    pub label: Option<String>,
    pub synonyms: Vec<String>,
    pub date_column: Option<String>,
    pub rework_column: Option<String>,
    pub rework_values: Vec<String>,
    pub duration_column: Option<String>,
}

impl SheetProfile {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.label.as_deref().unwrap_or(&self.name)
    }

    fn terms(&self) -> Vec<String> {
        std::iter::once(self.name.as_str())
            .chain(self.label.as_deref())
            .chain(self.synonyms.iter().map(|s| s.as_str()))
            .map(normalize)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn mentioned_in(&self, normalized_query: &str) -> bool {
        let padded = format!(" {normalized_query} ");
        self.terms().iter().any(|term| {
            inflections(term)
                .iter()
                .any(|candidate| padded.contains(&format!(" {candidate} ")))
        })
    }
}

fn inflections(term: &str) -> Vec<String> {
    let mut out = vec![term.to_string(), format!("{term}s"), format!("{term}es")];
    for suffix in ["es", "s"] {
        if let Some(stem) = term.strip_suffix(suffix) {
            if !stem.is_empty() {
                out.push(stem.to_string());
            }
        }
    }
    out
}

pub fn detect_sheet<'a>(query: &str, profiles: &'a [SheetProfile]) -> Option<&'a SheetProfile> {
    let normalized = normalize(query);
    if normalized.is_empty() {
        return None;
    }
    profiles.iter().find(|p| p.mentioned_in(&normalized))
}

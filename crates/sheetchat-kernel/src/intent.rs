use sheetchat_contracts::Intent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentRule {
    pub intent: Intent,
    pub keywords: Vec<String>,
}

impl IntentRule {
    pub fn new(intent: Intent, keywords: &[&str]) -> Self {
        Self {
            intent,
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    pub fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct IntentClassifier {
    rules: Vec<IntentRule>,
}

impl Default for IntentClassifier {
    fn default() -> Self {
        Self::new(vec![
            IntentRule::new(
                Intent::ExecutiveSummary,
                &[
                    "resumen ejecutivo",
                    "resumen",
                    "informe",
                    "reporte",
                    "indicadores",
                    "kpi",
                ],
            ),
            IntentRule::new(
                Intent::Count,
                &[
                    "cuántos",
                    "cuantos",
                    "cuántas",
                    "cuantas",
                    "cantidad",
                    "número de",
                    "numero de",
                    "total de",
                    "contar",
                ],
            ),
            IntentRule::new(
                Intent::List,
                &[
                    "lista",
                    "listar",
                    "listado",
                    "muéstrame",
                    "muestrame",
                    "mostrar",
                    "cuáles",
                    "cuales",
                    "enumera",
                ],
            ),
            IntentRule::new(
                Intent::MostRecent,
                &[
                    "último",
                    "ultimo",
                    "última",
                    "ultima",
                    "más reciente",
                    "mas reciente",
                    "reciente",
                ],
            ),
        ])
    }
}

impl IntentClassifier {
    pub fn new(rules: Vec<IntentRule>) -> Self {
        Self { rules }
    }

    pub fn classify(&self, query: &str) -> Intent {
        let lowered = query.to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.matches(&lowered))
            .map(|rule| rule.intent)
            .unwrap_or(Intent::Unclassified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_each_intent() {
        let c = IntentClassifier::default();
        assert_eq!(c.classify("¿Cuántos mantenimientos hay?"), Intent::Count);
        assert_eq!(c.classify("Dame la lista de equipos"), Intent::List);
        assert_eq!(c.classify("¿Cuál fue el ÚLTIMO mantenimiento?"), Intent::MostRecent);
        assert_eq!(c.classify("Quiero un informe del mes"), Intent::ExecutiveSummary);
        assert_eq!(c.classify("hola, ¿cómo estás?"), Intent::Unclassified);
    }

    #[test]
    fn summary_outranks_count() {
        let c = IntentClassifier::default();
        assert_eq!(
            c.classify("resumen ejecutivo: cuántos mantenimientos hubo"),
            Intent::ExecutiveSummary
        );
    }

    #[test]
    fn custom_rule_order_is_respected() {
        let c = IntentClassifier::new(vec![
            IntentRule::new(Intent::List, &["equipos"]),
            IntentRule::new(Intent::Count, &["cuantos"]),
        ]);
        assert_eq!(c.classify("cuantos equipos"), Intent::List);
        assert_eq!(c.classify("cuantos"), Intent::Count);
    }
}

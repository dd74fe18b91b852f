use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut gap = false;
    for c in text.to_lowercase().nfd() {
        if is_combining_mark(c) {
            continue;
        }
        if c.is_alphanumeric() {
            if gap && !out.is_empty() {
                out.push(' ');
            }
            gap = false;
            out.push(c);
        } else {
            gap = true;
        }
    }
    out
}

pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_diacritics_and_case() {
        assert_eq!(normalize("MÁQUINA"), "maquina");
        assert_eq!(normalize("¿Cuántos mantenimientos?"), "cuantos mantenimientos");
        assert_eq!(normalize("Ñandú  Pingüino"), "nandu pinguino");
    }

    #[test]
    fn is_idempotent() {
        for input in ["MÁQUINA", "  a--b__c  ", "Órden #123/2024", "ça va? très bien!"] {
            let once = normalize(input);
            assert_eq!(normalize(&once), once);
        }
    }

    #[test]
    fn empty_inputs_yield_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  ¡¿?! "), "");
    }

    #[test]
    fn tokens_split_on_punctuation() {
        assert_eq!(tokens("torno-CNC, línea 2"), vec!["torno", "cnc", "linea", "2"]);
    }
}

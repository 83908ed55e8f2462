//! # Spans de Entidades
//!
//! Um span é um intervalo semiaberto `[start, end)` sobre o texto, acompanhado de
//! um rótulo. Nos registros persistidos os offsets são **caracteres** (não bytes),
//! que é o formato esperado pelos pipelines de treinamento de NER.
//!
//! ## Exemplo
//! Em "Apple and Orange are fruit", o span "Apple and Orange":
//! `Span { start: 0, end: 16, label: "FRUIT" }`
//!
//! O rótulo é genérico (`Span<L>`): o resolvedor só olha para os offsets, então
//! qualquer tipo serve. No restante do crate o rótulo é uma `String`.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::offsets::CharOffsets;

/// Um intervalo `[start, end)` com um rótulo associado.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span<L = String> {
    /// Offset inicial (inclusivo)
    pub start: usize,
    /// Offset final (exclusivo)
    pub end: usize,
    /// Rótulo da entidade (ex: "PER", "FRUIT")
    pub label: L,
}

impl<L> Span<L> {
    pub fn new(start: usize, end: usize, label: L) -> Self {
        Self { start, end, label }
    }

    /// Comprimento do span. Spans invertidos têm comprimento zero.
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Verdadeiro para spans de comprimento zero ou invertidos (`end <= start`).
    pub fn is_degenerate(&self) -> bool {
        self.end <= self.start
    }

    /// Verifica se os dois intervalos compartilham algum offset.
    pub fn overlaps<M>(&self, other: &Span<M>) -> bool {
        !self.is_degenerate()
            && !other.is_degenerate()
            && self.start < other.end
            && other.start < self.end
    }
}

impl<L: fmt::Display> fmt::Display for Span<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.start, self.end, self.label)
    }
}

// Serializado como a tupla `[start, end, label]` do formato de treinamento.
impl<L: Serialize> Serialize for Span<L> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.start, self.end, &self.label).serialize(serializer)
    }
}

impl<'de, L: Deserialize<'de>> Deserialize<'de> for Span<L> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (start, end, label) = <(usize, usize, L)>::deserialize(deserializer)?;
        Ok(Span { start, end, label })
    }
}

/// Ordena os spans pela posição no texto (`start`, depois `end`).
///
/// O resolvedor devolve os spans na ordem de prioridade (mais longos primeiro);
/// quem precisa percorrer o texto da esquerda para a direita reordena com isto.
pub fn sort_by_position<L>(spans: &mut [Span<L>]) {
    spans.sort_by_key(|s| (s.start, s.end));
}

/// Destaca os spans no texto no formato `[trecho](RÓTULO)`.
///
/// Os offsets são de caracteres. Spans degenerados, fora do texto ou que
/// sobrepõem um span já desenhado são ignorados.
pub fn render_inline<L: fmt::Display>(text: &str, spans: &[Span<L>]) -> String {
    let offsets = CharOffsets::new(text);
    let mut ordered: Vec<&Span<L>> = spans.iter().collect();
    ordered.sort_by_key(|s| (s.start, s.end));

    let mut out = String::with_capacity(text.len() + spans.len() * 8);
    let mut cursor = 0;
    for span in ordered {
        if span.is_degenerate() || span.start < cursor || span.end > offsets.char_len() {
            continue;
        }
        let (byte_start, byte_end) = match (
            offsets.char_to_byte(span.start),
            offsets.char_to_byte(span.end),
        ) {
            (Some(s), Some(e)) => (s, e),
            _ => continue,
        };
        let byte_cursor = offsets.char_to_byte(cursor).unwrap_or(text.len());
        out.push_str(&text[byte_cursor..byte_start]);
        out.push('[');
        out.push_str(&text[byte_start..byte_end]);
        out.push_str("](");
        out.push_str(&span.label.to_string());
        out.push(')');
        cursor = span.end;
    }
    let byte_cursor = offsets.char_to_byte(cursor).unwrap_or(text.len());
    out.push_str(&text[byte_cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_len_and_degenerate() {
        assert_eq!(Span::new(2, 5, "X").len(), 3);
        assert!(Span::new(3, 3, "X").is_degenerate());
        assert!(Span::new(5, 3, "X").is_degenerate());
        assert_eq!(Span::new(5, 3, "X").len(), 0);
    }

    #[test]
    fn test_overlaps_half_open() {
        let a = Span::new(0, 5, "A");
        assert!(a.overlaps(&Span::new(4, 8, "B")));
        assert!(!a.overlaps(&Span::new(5, 8, "B")));
        assert!(!a.overlaps(&Span::new(2, 2, "B")));
    }

    #[test]
    fn test_serialized_as_tuple() {
        let span = Span::new(0, 5, "FRUIT".to_string());
        let json = serde_json::to_string(&span).unwrap();
        assert_eq!(json, r#"[0,5,"FRUIT"]"#);
        let back: Span = serde_json::from_str(&json).unwrap();
        assert_eq!(back, span);
    }

    #[test]
    fn test_sort_by_position() {
        let mut spans = vec![Span::new(5, 9, "B"), Span::new(0, 3, "A"), Span::new(0, 2, "C")];
        sort_by_position(&mut spans);
        let starts: Vec<(usize, usize)> = spans.iter().map(|s| (s.start, s.end)).collect();
        assert_eq!(starts, vec![(0, 2), (0, 3), (5, 9)]);
    }

    #[test]
    fn test_render_inline() {
        let text = "Apple and Orange are fruit";
        let spans = vec![Span::new(21, 26, "FOOD"), Span::new(0, 16, "FRUIT")];
        assert_eq!(
            render_inline(text, &spans),
            "[Apple and Orange](FRUIT) are [fruit](FOOD)"
        );
    }

    #[test]
    fn test_render_inline_multibyte() {
        // "São" ocupa 3 caracteres e 4 bytes
        let text = "Em São Paulo";
        let spans = vec![Span::new(3, 12, "LOC")];
        assert_eq!(render_inline(text, &spans), "Em [São Paulo](LOC)");
    }
}

//! # Entrada de Rótulos
//!
//! O usuário informa, para cada rótulo, as frases que devem ser marcadas no
//! texto. A entrada chega de duas formas:
//!
//! - **Texto estruturado** (uma única caixa de texto):
//!   ```text
//!   FRUIT: Apple, Orange;
//!   COLOR: red;
//!   ```
//! - **Campos por rótulo**: um campo livre por rótulo, com as frases separadas
//!   pelo delimitador configurado (padrão `,`).
//!
//! Em ambos os casos o resultado é um [`LabelInput`]: um mapeamento fixo do
//! conjunto de rótulos declarado ([`LabelSet`]) para listas de frases,
//! validado na borda.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AnnotatorError, Result};
use crate::offsets::CharOffsets;
use crate::span::{sort_by_position, Span};

/// Texto de preenchimento do modelo estruturado; não conta como frase.
pub const PLACEHOLDER: &str = "insert";

/// Conjunto finito de rótulos declarado pelo chamador, na ordem de exibição.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabelSet {
    labels: Vec<String>,
}

impl LabelSet {
    /// Valida e cria o conjunto: não vazio, sem rótulos em branco, sem
    /// repetição e sem os caracteres reservados `:` e `;`.
    pub fn new<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for label in labels {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return Err(AnnotatorError::InvalidLabels("rótulo em branco".into()));
            }
            if label.contains(':') || label.contains(';') {
                return Err(AnnotatorError::InvalidLabels(format!(
                    "'{label}' contém ':' ou ';'"
                )));
            }
            if !seen.insert(label.to_string()) {
                return Err(AnnotatorError::InvalidLabels(format!("'{label}' repetido")));
            }
            out.push(label.to_string());
        }
        if out.is_empty() {
            return Err(AnnotatorError::InvalidLabels(
                "informe ao menos um rótulo".into(),
            ));
        }
        Ok(Self { labels: out })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    fn require(&self, label: &str) -> Result<()> {
        if self.contains(label) {
            Ok(())
        } else {
            Err(AnnotatorError::UnknownLabel(label.to_string()))
        }
    }
}

/// Valor de um campo de rótulo exibido pela superfície.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelField {
    pub label: String,
    pub value: String,
}

/// Frases informadas pelo usuário, agrupadas por rótulo.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelInput {
    entries: Vec<(String, Vec<String>)>,
}

impl LabelInput {
    /// Entrada vazia com uma entrada por rótulo do conjunto.
    pub fn empty(labels: &LabelSet) -> Self {
        Self {
            entries: labels.iter().map(|l| (l.to_string(), Vec::new())).collect(),
        }
    }

    /// Adiciona uma frase a um rótulo declarado.
    ///
    /// Frases em branco e o marcador [`PLACEHOLDER`] são ignorados.
    pub fn push(&mut self, labels: &LabelSet, label: &str, phrase: &str) -> Result<()> {
        labels.require(label)?;
        let phrase = phrase.trim();
        if phrase.is_empty() || phrase == PLACEHOLDER {
            return Ok(());
        }
        match self.entries.iter_mut().find(|(l, _)| l == label) {
            Some((_, phrases)) => phrases.push(phrase.to_string()),
            None => self.entries.push((label.to_string(), vec![phrase.to_string()])),
        }
        Ok(())
    }

    /// Interpreta o formato estruturado `RÓTULO: frase1, frase2;`.
    ///
    /// Trechos vazios entre `;` são ignorados. Um trecho sem `:` é
    /// [`AnnotatorError::MalformedInput`]; um rótulo fora do conjunto é
    /// [`AnnotatorError::UnknownLabel`].
    pub fn parse_structured(text: &str, labels: &LabelSet, delimiter: &str) -> Result<Self> {
        let mut input = Self::empty(labels);
        for chunk in text.split(';') {
            let chunk = chunk.trim();
            if chunk.is_empty() {
                continue;
            }
            let (label, items) = chunk.split_once(':').ok_or_else(|| {
                AnnotatorError::MalformedInput(format!("trecho sem ':' -> \"{chunk}\""))
            })?;
            let label = label.trim();
            labels.require(label)?;
            for item in items.split(delimiter) {
                input.push(labels, label, item)?;
            }
        }
        Ok(input)
    }

    /// Monta a entrada a partir de um campo livre por rótulo.
    pub fn from_fields<I, K, V>(fields: I, labels: &LabelSet, delimiter: &str) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut input = Self::empty(labels);
        for (label, value) in fields {
            let label = label.as_ref().trim();
            labels.require(label)?;
            for item in value.as_ref().split(delimiter) {
                input.push(labels, label, item)?;
            }
        }
        Ok(input)
    }

    /// Frases de um rótulo (vazio se o rótulo não tiver frases).
    pub fn phrases(&self, label: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, p)| p.as_slice())
            .unwrap_or(&[])
    }

    /// Pares (rótulo, frases) na ordem do conjunto, incluindo rótulos vazios.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(l, p)| (l.as_str(), p.as_slice()))
    }

    /// Verdadeiro quando nenhum rótulo tem frases.
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|(_, p)| p.is_empty())
    }
}

/// Conteúdo inicial da caixa de texto estruturada.
///
/// ```rust
/// use annotator_core::label_input::{template, LabelSet};
///
/// let labels = LabelSet::new(["FRUIT", "COLOR"]).unwrap();
/// assert_eq!(template(&labels), "FRUIT: insert;\nCOLOR: insert;");
/// ```
pub fn template(labels: &LabelSet) -> String {
    let lines: Vec<String> = labels.iter().map(|l| format!("{l}: {PLACEHOLDER}")).collect();
    format!("{};", lines.join(";\n"))
}

/// Reconstrói os campos por rótulo a partir de spans já existentes.
///
/// Usado para pré-preencher a superfície com uma anotação salva: cada campo
/// recebe o trecho de texto dos spans daquele rótulo, em ordem de posição.
///
/// Trechos que contêm o delimitador ficam de fora: reenviados, virariam duas
/// frases diferentes.
pub fn prefill(
    labels: &LabelSet,
    text: &str,
    spans: &[Span],
    delimiter: &str,
) -> Vec<LabelField> {
    let offsets = CharOffsets::new(text);
    let mut ordered = spans.to_vec();
    sort_by_position(&mut ordered);

    labels
        .iter()
        .map(|label| {
            let surfaces: Vec<&str> = ordered
                .iter()
                .filter(|s| s.label == label)
                .filter_map(|s| {
                    let start = offsets.char_to_byte(s.start)?;
                    let end = offsets.char_to_byte(s.end)?;
                    text.get(start..end)
                })
                .filter(|surface| {
                    let splits = surface.contains(delimiter);
                    if splits {
                        warn!(
                            label = %label,
                            surface = %surface,
                            "trecho com o delimitador fora do pré-preenchimento"
                        );
                    }
                    !splits
                })
                .collect();
            LabelField {
                label: label.to_string(),
                value: surfaces.join(&format!("{delimiter} ")),
            }
        })
        .collect()
}

/// Instruções exibidas ao usuário no início da sessão.
pub fn instructions(delimiter: &str) -> String {
    format!(
        "Instruções\n\
         Para cada rótulo, informe as entidades separadas por '{delimiter}'.\n\
         No formato estruturado: RÓTULO_A: item1{delimiter} item2; RÓTULO_B: itemX;\n\
         Se o texto não tiver entidades, envie sem alterar.\n\
         Se um rótulo não tiver entidades, deixe o campo como está.\n\n\
         Ações:\n\
         * submit grava a anotação (sobrescreve a existente, se houver).\n\
         * skip avança sem alterar a anotação existente.\n\
         * finish encerra a sessão de anotação.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelSet {
        LabelSet::new(["FRUIT", "COLOR"]).unwrap()
    }

    #[test]
    fn test_label_set_validation() {
        assert!(LabelSet::new(Vec::<&str>::new()).is_err());
        assert!(LabelSet::new(["A", " "]).is_err());
        assert!(LabelSet::new(["A", "A"]).is_err());
        assert!(LabelSet::new(["A:B"]).is_err());
        let set = LabelSet::new([" PER ", "LOC"]).unwrap();
        assert!(set.contains("PER"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_parse_structured() {
        let input =
            LabelInput::parse_structured("FRUIT: Apple, Orange ,;\nCOLOR: red;", &labels(), ",")
                .unwrap();
        assert_eq!(input.phrases("FRUIT"), ["Apple", "Orange"]);
        assert_eq!(input.phrases("COLOR"), ["red"]);
    }

    #[test]
    fn test_parse_template_is_empty() {
        let input = LabelInput::parse_structured(&template(&labels()), &labels(), ",").unwrap();
        assert!(input.is_empty());
    }

    #[test]
    fn test_parse_repeated_label_appends() {
        let input =
            LabelInput::parse_structured("FRUIT: Apple; FRUIT: Pear;", &labels(), ",").unwrap();
        assert_eq!(input.phrases("FRUIT"), ["Apple", "Pear"]);
    }

    #[test]
    fn test_parse_malformed_chunk() {
        let err = LabelInput::parse_structured("FRUIT Apple;", &labels(), ",").unwrap_err();
        assert!(matches!(err, AnnotatorError::MalformedInput(_)));
    }

    #[test]
    fn test_parse_unknown_label() {
        let err = LabelInput::parse_structured("ANIMAL: cat;", &labels(), ",").unwrap_err();
        assert!(matches!(err, AnnotatorError::UnknownLabel(l) if l == "ANIMAL"));
    }

    #[test]
    fn test_from_fields_with_custom_delimiter() {
        let input = LabelInput::from_fields(
            [("FRUIT", "Apple | Orange"), ("COLOR", "")],
            &labels(),
            "|",
        )
        .unwrap();
        assert_eq!(input.phrases("FRUIT"), ["Apple", "Orange"]);
        assert!(input.phrases("COLOR").is_empty());
        let order: Vec<&str> = input.iter().map(|(l, _)| l).collect();
        assert_eq!(order, vec!["FRUIT", "COLOR"]);
    }

    #[test]
    fn test_prefill_from_spans() {
        let text = "red Apple and São Tomé";
        let spans = vec![
            Span::new(14, 22, "FRUIT".to_string()),
            Span::new(4, 9, "FRUIT".to_string()),
            Span::new(0, 3, "COLOR".to_string()),
        ];
        let fields = prefill(&labels(), text, &spans, ",");
        assert_eq!(fields[0].label, "FRUIT");
        assert_eq!(fields[0].value, "Apple, São Tomé");
        assert_eq!(fields[1].value, "red");
    }

    #[test]
    fn test_prefill_skips_surfaces_with_delimiter() {
        let labels = LabelSet::new(["PER"]).unwrap();
        let text = "Smith, John met Ana";
        let spans = vec![
            Span::new(0, 11, "PER".to_string()),
            Span::new(16, 19, "PER".to_string()),
        ];
        let fields = prefill(&labels, text, &spans, ",");
        assert_eq!(fields[0].value, "Ana");
        // com outro delimitador o trecho volta
        let fields = prefill(&labels, text, &spans, "|");
        assert_eq!(fields[0].value, "Smith, John| Ana");
    }

    #[test]
    fn test_instructions_mention_delimiter() {
        assert!(instructions("|").contains("separadas por '|'"));
    }
}

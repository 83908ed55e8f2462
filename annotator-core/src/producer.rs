//! # Produtores de Spans
//!
//! Transformam as frases digitadas pelo usuário em spans candidatos sobre o
//! texto e os filtram com o [resolvedor](crate::resolver).
//!
//! ## Variantes
//!
//! - [`LiteralMatcher`]: cada frase vira o padrão `\b<frase>\b` e todas as
//!   ocorrências no texto bruto são marcadas.
//! - [`LexicalMatcher`]: frase e texto são tokenizados e o casamento é feito
//!   token a token (opcionalmente ignorando maiúsculas); o intervalo de tokens
//!   é projetado de volta para offsets de caractere.
//!
//! ## Filtragem em dois estágios
//!
//! 1. **Por rótulo**: os candidatos de um mesmo rótulo são resolvidos entre si
//!    ("New York" suprime "York" da mesma lista).
//! 2. **Global**: a união de todos os rótulos é resolvida mais uma vez, o que
//!    arbitra frases de rótulos diferentes sobre o mesmo trecho.
//!
//! A variante é escolhida na construção ([`SpanProducer`]); o restante do
//! fluxo não sabe qual delas está em uso.

use rayon::prelude::*;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnnotatorError, Result};
use crate::label_input::LabelInput;
use crate::offsets::CharOffsets;
use crate::resolver::resolve;
use crate::span::Span;
use crate::tokenizer::{tokenize_with_mode, Token, TokenizerMode};

/// Como a frase digitada é interpretada pelo [`LiteralMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PatternSyntax {
    /// A frase é texto literal (metacaracteres escapados).
    #[default]
    Literal,
    /// A frase é uma expressão regular.
    Regex,
}

/// Opções do casamento literal, equivalentes às flags de regex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MatchOptions {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
    pub pattern_syntax: PatternSyntax,
}

/// Atributo do token comparado pelo [`LexicalMatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchAttr {
    /// Texto em minúsculas ("apple" casa com "Apple").
    #[default]
    Lower,
    /// Texto exato.
    Orth,
}

/// Casamento por fronteira de palavra sobre o texto bruto.
#[derive(Debug, Clone, Default)]
pub struct LiteralMatcher {
    pub options: MatchOptions,
}

impl LiteralMatcher {
    pub fn new(options: MatchOptions) -> Self {
        Self { options }
    }

    fn compile(&self, phrase: &str) -> Result<Regex> {
        let body = match self.options.pattern_syntax {
            PatternSyntax::Literal => regex::escape(phrase),
            PatternSyntax::Regex => phrase.to_string(),
        };
        RegexBuilder::new(&format!(r"\b(?:{body})\b"))
            .case_insensitive(self.options.case_insensitive)
            .multi_line(self.options.multi_line)
            .dot_matches_new_line(self.options.dot_all)
            .build()
            .map_err(|source| AnnotatorError::InvalidPattern {
                phrase: phrase.to_string(),
                source,
            })
    }

    /// Candidatos de um rótulo, já resolvidos entre si.
    fn label_spans(
        &self,
        text: &str,
        offsets: &CharOffsets,
        label: &str,
        phrases: &[String],
    ) -> Result<Vec<Span>> {
        let mut candidates = Vec::new();
        for phrase in phrases {
            let re = self.compile(phrase)?;
            for m in re.find_iter(text) {
                // find_iter sempre devolve fronteiras de caractere
                if let Some((start, end)) = offsets.byte_range_to_chars(m.start(), m.end()) {
                    candidates.push(Span::new(start, end, label.to_string()));
                }
            }
        }
        Ok(resolve(candidates))
    }
}

/// Casamento de frases alinhado a tokens.
#[derive(Debug, Clone, Default)]
pub struct LexicalMatcher {
    pub attr: MatchAttr,
    pub tokenizer_mode: TokenizerMode,
}

impl LexicalMatcher {
    pub fn new(attr: MatchAttr, tokenizer_mode: TokenizerMode) -> Self {
        Self { attr, tokenizer_mode }
    }

    fn key(&self, token: &Token) -> String {
        match self.attr {
            MatchAttr::Lower => token.text.to_lowercase(),
            MatchAttr::Orth => token.text.clone(),
        }
    }

    /// Candidatos de um rótulo: resolvidos sobre índices de tokens e
    /// projetados para offsets de caractere.
    fn label_spans(
        &self,
        tokens: &[Token],
        keys: &[String],
        offsets: &CharOffsets,
        label: &str,
        phrases: &[String],
    ) -> Vec<Span> {
        let mut token_spans: Vec<Span<()>> = Vec::new();
        for phrase in phrases {
            let pattern: Vec<String> = tokenize_with_mode(phrase, self.tokenizer_mode)
                .iter()
                .map(|t| self.key(t))
                .collect();
            if pattern.is_empty() || pattern.len() > keys.len() {
                continue;
            }
            for (i, window) in keys.windows(pattern.len()).enumerate() {
                if window == pattern.as_slice() {
                    token_spans.push(Span::new(i, i + pattern.len(), ()));
                }
            }
        }

        resolve(token_spans)
            .into_iter()
            .filter_map(|s| {
                let start = offsets.byte_to_char(tokens[s.start].start)?;
                let end = offsets.byte_to_char(tokens[s.end - 1].end)?;
                Some(Span::new(start, end, label.to_string()))
            })
            .collect()
    }
}

/// Produtor de spans, escolhido na construção.
#[derive(Debug, Clone)]
pub enum SpanProducer {
    Literal(LiteralMatcher),
    Lexical(LexicalMatcher),
}

impl Default for SpanProducer {
    fn default() -> Self {
        SpanProducer::Literal(LiteralMatcher::default())
    }
}

impl SpanProducer {
    /// Spans finais (sem sobreposição) das frases de `input` sobre `text`.
    ///
    /// Os offsets são de caractere; a ordem é a de prioridade do resolvedor.
    pub fn produce(&self, text: &str, input: &LabelInput) -> Result<Vec<Span>> {
        let offsets = CharOffsets::new(text);
        let mut per_label = Vec::new();

        match self {
            SpanProducer::Literal(matcher) => {
                for (label, phrases) in input.iter() {
                    if phrases.is_empty() {
                        continue;
                    }
                    per_label.extend(matcher.label_spans(text, &offsets, label, phrases)?);
                }
            }
            SpanProducer::Lexical(matcher) => {
                let tokens = tokenize_with_mode(text, matcher.tokenizer_mode);
                let keys: Vec<String> = tokens.iter().map(|t| matcher.key(t)).collect();
                for (label, phrases) in input.iter() {
                    if phrases.is_empty() {
                        continue;
                    }
                    per_label.extend(matcher.label_spans(&tokens, &keys, &offsets, label, phrases));
                }
            }
        }

        let candidates = per_label.len();
        let spans = resolve(per_label);
        debug!(
            producer = self.name(),
            candidates,
            kept = spans.len(),
            "spans produzidos"
        );
        Ok(spans)
    }

    /// Aplica a mesma entrada a vários textos em paralelo.
    ///
    /// O resultado de cada texto é idêntico ao de [`produce`](Self::produce).
    pub fn produce_batch<S>(&self, texts: &[S], input: &LabelInput) -> Result<Vec<Vec<Span>>>
    where
        S: AsRef<str> + Sync,
    {
        texts
            .par_iter()
            .map(|text| self.produce(text.as_ref(), input))
            .collect()
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpanProducer::Literal(_) => "literal",
            SpanProducer::Lexical(_) => "lexical",
        }
    }
}

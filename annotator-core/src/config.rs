//! # Configuração
//!
//! Parâmetros de uma sessão de anotação, lidos de JSON. Todos os campos têm
//! valor padrão, exceto `labels`, que precisa ser informado.
//!
//! ```json
//! {
//!   "labels": ["FRUIT", "COLOR"],
//!   "producer": "lexical",
//!   "attr": "lower",
//!   "delimiter": ",",
//!   "case_insensitive": false,
//!   "include_skip": true,
//!   "sample": { "fraction": 0.5, "seed": 42 }
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AnnotatorError, Result};
use crate::label_input::LabelSet;
use crate::producer::{LexicalMatcher, LiteralMatcher, MatchAttr, MatchOptions, SpanProducer};
use crate::record::AnnotationStore;
use crate::sampling::{sample_indices, Example, SampleOptions};
use crate::session::AnnotationSession;
use crate::tokenizer::TokenizerMode;

/// Qual produtor de spans a sessão usa.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProducerKind {
    /// Casamento literal por fronteira de palavra (regex).
    #[default]
    Literal,
    /// Casamento de frases alinhado a tokens.
    Lexical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub labels: Vec<String>,
    pub producer: ProducerKind,
    pub delimiter: String,
    pub attr: MatchAttr,
    pub tokenizer_mode: TokenizerMode,
    /// Flags do casamento literal (`case_insensitive`, `multi_line`,
    /// `dot_all`, `pattern_syntax`), no mesmo nível dos demais campos.
    #[serde(flatten)]
    pub matching: MatchOptions,
    pub include_skip: bool,
    pub sample: SampleOptions,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            labels: Vec::new(),
            producer: ProducerKind::default(),
            delimiter: ",".to_string(),
            attr: MatchAttr::default(),
            tokenizer_mode: TokenizerMode::default(),
            matching: MatchOptions::default(),
            include_skip: true,
            sample: SampleOptions::default(),
        }
    }
}

impl AnnotatorConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Self::from_json_str(&std::fs::read_to_string(path)?)?;
        info!(path = %path.display(), labels = config.labels.len(), "configuração carregada");
        Ok(config)
    }

    /// Valida os rótulos e o delimitador, devolvendo o conjunto de rótulos.
    pub fn validate(&self) -> Result<LabelSet> {
        if self.delimiter.trim().is_empty() {
            return Err(AnnotatorError::Config("delimitador vazio".into()));
        }
        if self.delimiter.contains(';') || self.delimiter.contains(':') {
            return Err(AnnotatorError::Config(format!(
                "o delimitador '{}' não pode conter ':' ou ';'",
                self.delimiter
            )));
        }
        LabelSet::new(&self.labels)
    }

    pub fn build_producer(&self) -> SpanProducer {
        match self.producer {
            ProducerKind::Literal => SpanProducer::Literal(LiteralMatcher::new(self.matching)),
            ProducerKind::Lexical => {
                SpanProducer::Lexical(LexicalMatcher::new(self.attr, self.tokenizer_mode))
            }
        }
    }

    /// Amostra os exemplos e monta a sessão.
    pub fn build_session(&self, examples: Vec<Example>) -> Result<AnnotationSession> {
        let labels = self.validate()?;
        let picks = sample_indices(&examples, &self.sample)?;
        info!(
            producer = self.build_producer().name(),
            examples = picks.len(),
            "sessão criada"
        );
        Ok(
            AnnotationSession::from_sample(examples, picks, self.build_producer(), labels)?
                .with_skip(self.include_skip)
                .with_delimiter(self.delimiter.clone()),
        )
    }

    /// Como [`build_session`](Self::build_session), retomando um store salvo.
    ///
    /// Os índices do store se referem à lista de exemplos original, então a
    /// amostra pode ser sorteada de novo: cada registro continua preso ao seu
    /// exemplo. Um registro cujo texto difere do exemplo no mesmo índice é
    /// [`AnnotatorError::InvalidStore`].
    pub fn resume_session(
        &self,
        examples: Vec<Example>,
        store: AnnotationStore,
    ) -> Result<AnnotationSession> {
        if store.len() != examples.len() {
            return Err(AnnotatorError::InvalidStore(format!(
                "o store tem {} posições, a lista de exemplos tem {}",
                store.len(),
                examples.len()
            )));
        }
        for (index, record) in store.records() {
            if examples.get(index).map(|e| e.text.as_str()) != Some(record.text()) {
                return Err(AnnotatorError::InvalidStore(format!(
                    "o registro {index} não corresponde ao texto do exemplo"
                )));
            }
        }
        info!(
            examples = examples.len(),
            annotated = store.annotated_count(),
            "sessão retomada"
        );
        self.build_session(examples)?.with_store(store)
    }
}

//! # Sessão de Anotação
//!
//! A sessão percorre os exemplos um a um. O estado é explícito
//! ([`SessionState`]) e só muda pelas transições:
//!
//! | Transição  | Efeito                                                    |
//! |------------|-----------------------------------------------------------|
//! | `submit`   | produz e resolve os spans, grava o registro, avança       |
//! | `skip`     | avança sem tocar no registro existente                    |
//! | `finish`   | encerra a sessão; transições seguintes falham             |
//!
//! A superfície de exibição é passiva: assina a sessão
//! ([`AnnotationSession::subscribe`]) e recebe um [`SessionEvent`] depois de
//! cada transição, no mesmo estilo dos eventos do pipeline enviados por `mpsc`.

use std::fmt;
use std::sync::mpsc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AnnotatorError, Result};
use crate::label_input::{prefill, LabelField, LabelInput, LabelSet};
use crate::producer::SpanProducer;
use crate::record::{AnnotationRecord, AnnotationStore};
use crate::sampling::Example;
use crate::span::Span;

/// Estado observável da sessão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// Índice do exemplo exibido (igual a `total` quando acabaram os exemplos).
    pub current_index: usize,
    pub total: usize,
    pub is_finished: bool,
}

/// Contadores exibidos ao usuário.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub annotated: usize,
    pub remaining: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} exemplos anotados, {} exemplos restantes",
            self.annotated, self.remaining
        )
    }
}

/// O exemplo atual como a superfície deve exibi-lo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExampleView {
    /// Posição na sessão.
    pub index: usize,
    /// Índice na lista de exemplos original (chave do store).
    pub example_index: usize,
    pub text: String,
    /// Campos por rótulo, pré-preenchidos com a anotação salva (se houver).
    pub fields: Vec<LabelField>,
    pub progress: Progress,
}

/// Eventos emitidos após cada transição.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SessionEvent {
    /// Um novo exemplo passou a ser o atual.
    ExampleShown { view: ExampleView },
    /// Um registro foi gravado (`replaced` quando sobrescreveu outro).
    AnnotationStored {
        index: usize,
        example_index: usize,
        record: AnnotationRecord,
        replaced: bool,
    },
    /// O exemplo foi pulado.
    Skipped { index: usize },
    /// A sessão terminou (por `finish` ou por falta de exemplos).
    Finished { progress: Progress },
}

/// Sessão de anotação sobre uma lista de exemplos.
///
/// Os registros são guardados pelo índice do exemplo na lista original, não
/// pela posição na amostra: retomar com outra amostra não troca os registros
/// de lugar.
#[derive(Debug)]
pub struct AnnotationSession {
    examples: Vec<Example>,
    /// Índice original de cada exemplo da sessão.
    origins: Vec<usize>,
    producer: SpanProducer,
    labels: LabelSet,
    delimiter: String,
    include_skip: bool,
    state: SessionState,
    store: AnnotationStore,
    subscribers: Vec<mpsc::Sender<SessionEvent>>,
}

impl AnnotationSession {
    pub fn new(examples: Vec<Example>, producer: SpanProducer, labels: LabelSet) -> Self {
        let total = examples.len();
        Self {
            examples,
            origins: (0..total).collect(),
            producer,
            labels,
            delimiter: ",".to_string(),
            include_skip: true,
            state: SessionState {
                current_index: 0,
                total,
                is_finished: total == 0,
            },
            store: AnnotationStore::new(total),
            subscribers: Vec::new(),
        }
    }

    /// Habilita ou desabilita a transição `skip`.
    pub fn with_skip(mut self, include_skip: bool) -> Self {
        self.include_skip = include_skip;
        self
    }

    /// Delimitador das frases nos campos por rótulo.
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Sessão sobre uma amostra de `source`: `picks` são os índices
    /// sorteados, na ordem em que serão exibidos.
    pub fn from_sample(
        source: Vec<Example>,
        picks: Vec<usize>,
        producer: SpanProducer,
        labels: LabelSet,
    ) -> Result<Self> {
        let source_len = source.len();
        let mut slots: Vec<Option<Example>> = source.into_iter().map(Some).collect();
        let mut examples = Vec::with_capacity(picks.len());
        for &pick in &picks {
            let example = slots.get_mut(pick).and_then(Option::take).ok_or_else(|| {
                AnnotatorError::InvalidSample(format!(
                    "índice {pick} inválido ou repetido numa lista de {source_len} exemplos"
                ))
            })?;
            examples.push(example);
        }
        let mut session = Self::new(examples, producer, labels);
        session.origins = picks;
        session.store = AnnotationStore::new(source_len);
        Ok(session)
    }

    /// Retoma a sessão sobre registros já salvos (os exemplos anotados
    /// aparecem pré-preenchidos).
    ///
    /// O store precisa ter o tamanho da lista original e cada registro de um
    /// exemplo da sessão precisa ter o mesmo texto desse exemplo.
    pub fn with_store(mut self, store: AnnotationStore) -> Result<Self> {
        if store.len() != self.store.len() {
            return Err(AnnotatorError::InvalidStore(format!(
                "o store tem {} posições, a lista de exemplos tem {}",
                store.len(),
                self.store.len()
            )));
        }
        for (example, &origin) in self.examples.iter().zip(&self.origins) {
            if let Some(record) = store.get(origin) {
                if record.text() != example.text {
                    return Err(AnnotatorError::InvalidStore(format!(
                        "o registro {origin} não corresponde ao texto do exemplo"
                    )));
                }
            }
        }
        self.store = store;
        Ok(self)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn labels(&self) -> &LabelSet {
        &self.labels
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn include_skip(&self) -> bool {
        self.include_skip
    }

    pub fn store(&self) -> &AnnotationStore {
        &self.store
    }

    pub fn into_store(self) -> AnnotationStore {
        self.store
    }

    pub fn progress(&self) -> Progress {
        Progress {
            annotated: self.store.annotated_count(),
            remaining: self.state.total.saturating_sub(self.state.current_index),
        }
    }

    /// O exemplo atual, ou `None` se a sessão terminou.
    pub fn current(&self) -> Option<ExampleView> {
        if self.state.is_finished {
            return None;
        }
        let index = self.state.current_index;
        let example = self.examples.get(index)?;
        let example_index = *self.origins.get(index)?;
        let spans: &[Span] = self
            .store
            .get(example_index)
            .map(|r| r.entities())
            .unwrap_or(&[]);
        Some(ExampleView {
            index,
            example_index,
            text: example.text.clone(),
            fields: prefill(&self.labels, &example.text, spans, &self.delimiter),
            progress: self.progress(),
        })
    }

    /// Registra uma superfície passiva.
    ///
    /// O receptor recebe imediatamente o estado atual (`ExampleShown` ou
    /// `Finished`) e depois um evento por transição.
    pub fn subscribe(&mut self) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel();
        let _ = tx.send(self.snapshot());
        self.subscribers.push(tx);
        rx
    }

    /// Spans que `submit` gravaria para o exemplo atual, sem gravar nada.
    pub fn preview(&self, input: &LabelInput) -> Result<Vec<Span>> {
        let example = self.active_example()?;
        self.producer.produce(&example.text, input)
    }

    /// Grava a anotação do exemplo atual e avança.
    pub fn submit(&mut self, input: &LabelInput) -> Result<AnnotationRecord> {
        let index = self.state.current_index;
        let text = self.active_example()?.text.clone();
        let example_index = self
            .origins
            .get(index)
            .copied()
            .ok_or(AnnotatorError::SessionFinished)?;
        let spans = self.producer.produce(&text, input)?;
        let record = AnnotationRecord::resolve(text, spans)?;
        let replaced = self.store.submit(example_index, record.clone())?.is_some();
        info!(
            index,
            example_index,
            entities = record.entities().len(),
            replaced,
            "anotação gravada"
        );
        self.emit(SessionEvent::AnnotationStored {
            index,
            example_index,
            record: record.clone(),
            replaced,
        });
        self.advance();
        Ok(record)
    }

    /// Avança sem alterar o registro do exemplo atual.
    pub fn skip(&mut self) -> Result<()> {
        if !self.include_skip {
            warn!("tentativa de pular com a opção desabilitada");
            return Err(AnnotatorError::SkipDisabled);
        }
        self.active_example()?;
        let index = self.state.current_index;
        info!(index, "exemplo pulado");
        self.emit(SessionEvent::Skipped { index });
        self.advance();
        Ok(())
    }

    /// Encerra a sessão. Chamar de novo não tem efeito.
    pub fn finish(&mut self) -> Progress {
        if !self.state.is_finished {
            self.state.is_finished = true;
            info!(progress = %self.progress(), "sessão encerrada");
            self.emit(SessionEvent::Finished {
                progress: self.progress(),
            });
        }
        self.progress()
    }

    fn active_example(&self) -> Result<&Example> {
        if self.state.is_finished {
            return Err(AnnotatorError::SessionFinished);
        }
        self.examples
            .get(self.state.current_index)
            .ok_or(AnnotatorError::SessionFinished)
    }

    fn advance(&mut self) {
        self.state.current_index += 1;
        if self.state.current_index >= self.state.total {
            self.finish();
        } else {
            let event = self.snapshot();
            self.emit(event);
        }
    }

    /// Evento que descreve o estado atual: `ExampleShown` ou `Finished`.
    pub fn snapshot(&self) -> SessionEvent {
        match self.current() {
            Some(view) => SessionEvent::ExampleShown { view },
            None => SessionEvent::Finished {
                progress: self.progress(),
            },
        }
    }

    fn emit(&mut self, event: SessionEvent) {
        // descarta assinantes que fecharam o receptor
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

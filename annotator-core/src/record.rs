//! # Registros de Anotação e Persistência
//!
//! Cada exemplo anotado vira um [`AnnotationRecord`], serializado no formato de
//! dados de treinamento de NER:
//!
//! ```text
//! ["Apple and Orange are fruit", {"entities": [[0, 16, "FRUIT"]]}]
//! ```
//!
//! Os spans de um registro são **sempre** a saída do resolvedor: o único
//! construtor ([`AnnotationRecord::resolve`]) valida e resolve os candidatos, e a
//! leitura de arquivos passa pelo mesmo caminho.
//!
//! O [`AnnotationStore`] guarda um registro por índice de exemplo. Reenviar um
//! exemplo substitui o registro inteiro; nunca há mutação parcial.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::{AnnotatorError, Result};
use crate::resolver::resolve;
use crate::span::Span;

/// Par (texto, entidades) persistido.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRecord {
    text: String,
    entities: Vec<Span>,
}

#[derive(Serialize)]
struct EntitiesRef<'a> {
    entities: &'a [Span],
}

#[derive(Deserialize)]
struct EntitiesOwned {
    entities: Vec<Span>,
}

impl AnnotationRecord {
    /// Cria o registro a partir de spans candidatos.
    ///
    /// Rejeita spans degenerados ([`AnnotatorError::MalformedSpan`]) ou que
    /// passem do fim do texto ([`AnnotatorError::SpanOutOfBounds`], medido em
    /// caracteres) e guarda apenas a saída do resolvedor.
    pub fn resolve(text: impl Into<String>, candidates: Vec<Span>) -> Result<Self> {
        let text = text.into();
        let len = text.chars().count();
        for span in &candidates {
            if span.is_degenerate() {
                return Err(AnnotatorError::MalformedSpan {
                    start: span.start,
                    end: span.end,
                });
            }
            if span.end > len {
                return Err(AnnotatorError::SpanOutOfBounds {
                    start: span.start,
                    end: span.end,
                    len,
                });
            }
        }
        Ok(Self {
            text,
            entities: resolve(candidates),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn entities(&self) -> &[Span] {
        &self.entities
    }
}

impl Serialize for AnnotationRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        (
            &self.text,
            EntitiesRef {
                entities: &self.entities,
            },
        )
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AnnotationRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let (text, entities) = <(String, EntitiesOwned)>::deserialize(deserializer)?;
        AnnotationRecord::resolve(text, entities.entities).map_err(D::Error::custom)
    }
}

/// Uma linha do arquivo JSONL: o índice do exemplo e o registro.
#[derive(Serialize)]
struct StoredLineRef<'a> {
    index: usize,
    record: &'a AnnotationRecord,
}

#[derive(Deserialize)]
struct StoredLine {
    index: usize,
    record: AnnotationRecord,
}

/// Registros da sessão, um por índice de exemplo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationStore {
    slots: Vec<Option<AnnotationRecord>>,
}

impl AnnotationStore {
    /// Store vazio para `total` exemplos.
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
        }
    }

    /// Grava (ou substitui) o registro do exemplo `index`.
    ///
    /// Retorna o registro anterior, se havia um. Um índice fora do store é
    /// [`AnnotatorError::InvalidStore`].
    pub fn submit(
        &mut self,
        index: usize,
        record: AnnotationRecord,
    ) -> Result<Option<AnnotationRecord>> {
        let total = self.slots.len();
        let slot = self.slots.get_mut(index).ok_or_else(|| {
            AnnotatorError::InvalidStore(format!(
                "índice {index} fora do store de {total} exemplos"
            ))
        })?;
        Ok(slot.replace(record))
    }

    pub fn get(&self, index: usize) -> Option<&AnnotationRecord> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    pub fn annotated_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Número de posições (exemplos) cobertas pelo store.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Registros existentes em ordem de índice.
    pub fn records(&self) -> impl Iterator<Item = (usize, &AnnotationRecord)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|r| (i, r)))
    }

    /// Lista de registros no formato de dados de treinamento (array JSON).
    pub fn to_json_array(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.records()
                .filter_map(|(_, r)| serde_json::to_value(r).ok())
                .collect(),
        )
    }

    /// Escreve um registro por linha (`{"index": i, "record": [...]}`).
    pub fn write_jsonl<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        for (index, record) in self.records() {
            serde_json::to_writer(&mut writer, &StoredLineRef { index, record })?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Lê um store de `total` exemplos escrito por
    /// [`write_jsonl`](Self::write_jsonl).
    ///
    /// Linhas em branco são ignoradas; cada registro é validado e resolvido.
    /// Um índice `>= total` é [`AnnotatorError::InvalidStore`].
    pub fn read_jsonl<R: Read>(reader: R, total: usize) -> Result<Self> {
        let mut store = Self::new(total);
        for line in BufReader::new(reader).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let stored: StoredLine = serde_json::from_str(&line)?;
            store.submit(stored.index, stored.record)?;
        }
        debug!(records = store.annotated_count(), "store carregado");
        Ok(store)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.write_jsonl(File::create(path)?)?;
        info!(path = %path.display(), records = self.annotated_count(), "anotações salvas");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, total: usize) -> Result<Self> {
        Self::read_jsonl(File::open(path)?, total)
    }
}

//! # annotator-core: Anotação Interativa de Entidades Nomeadas (NER)
//!
//! Este crate implementa o núcleo de uma ferramenta de anotação com humano no
//! laço: o usuário vê um texto, informa as entidades de cada rótulo e o sistema
//! converte essas frases em spans de caractere prontos para treinar modelos de
//! NER.
//!
//! ## Arquitetura do Sistema
//!
//! O dado flui em uma única direção:
//!
//! 1.  **Entrada** ([`label_input`]): frases digitadas por rótulo
//!     (`FRUIT: Apple, Orange;`).
//! 2.  **Produção** ([`producer`]): as frases viram spans candidatos por
//!     casamento literal (regex) ou léxico (tokens, [`tokenizer`]).
//! 3.  **Resolução** ([`resolver`]): os candidatos sobrepostos são filtrados;
//!     o span mais longo vence.
//! 4.  **Persistência** ([`record`]): `(texto, {entities: [...]})` por exemplo.
//!
//! A [`session`] orquestra esse fluxo exemplo a exemplo, depois da
//! [`sampling`] dos textos, e a [`config`] monta tudo a partir de JSON.
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use annotator_core::{LabelInput, LabelSet, SpanProducer, Span};
//!
//! let labels = LabelSet::new(["FRUIT"]).unwrap();
//! let input = LabelInput::parse_structured("FRUIT: Apple, Apple and Orange;", &labels, ",").unwrap();
//!
//! let spans = SpanProducer::default()
//!     .produce("Apple and Orange are fruit", &input)
//!     .unwrap();
//!
//! // "Apple" está dentro de "Apple and Orange": só o span mais longo sobrevive
//! assert_eq!(spans, vec![Span::new(0, 16, "FRUIT".to_string())]);
//! ```

pub mod config;
pub mod error;
pub mod label_input;
pub mod offsets;
pub mod producer;
pub mod record;
pub mod resolver;
pub mod sampling;
pub mod session;
pub mod span;
pub mod tokenizer;

pub use config::{AnnotatorConfig, ProducerKind};
pub use error::{AnnotatorError, Result};
pub use label_input::{LabelInput, LabelSet};
pub use producer::{LexicalMatcher, LiteralMatcher, SpanProducer};
pub use record::{AnnotationRecord, AnnotationStore};
pub use resolver::resolve;
pub use sampling::Example;
pub use session::{AnnotationSession, SessionEvent, SessionState};
pub use span::Span;

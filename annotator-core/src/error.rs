//! Erros do anotador.
//!
//! O resolvedor de spans é total e nunca falha; os erros abaixo pertencem às
//! bordas do sistema: entrada digitada pelo usuário, padrões de busca,
//! registros persistidos, amostragem e transições da sessão.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AnnotatorError>;

#[derive(Error, Debug)]
pub enum AnnotatorError {
    #[error("Span malformado ({start}, {end}): o fim deve ser maior que o início")]
    MalformedSpan { start: usize, end: usize },

    #[error("Span ({start}, {end}) ultrapassa o texto de {len} caracteres")]
    SpanOutOfBounds { start: usize, end: usize, len: usize },

    #[error("Entrada de rótulos malformada: {0}")]
    MalformedInput(String),

    #[error("Rótulo desconhecido: {0}")]
    UnknownLabel(String),

    #[error("Conjunto de rótulos inválido: {0}")]
    InvalidLabels(String),

    #[error("Padrão inválido para '{phrase}': {source}")]
    InvalidPattern {
        phrase: String,
        #[source]
        source: regex::Error,
    },

    #[error("Amostragem inválida: {0}")]
    InvalidSample(String),

    #[error("Arquivo de anotações inválido: {0}")]
    InvalidStore(String),

    #[error("A sessão de anotação já foi encerrada")]
    SessionFinished,

    #[error("A opção de pular exemplos está desabilitada")]
    SkipDisabled,

    #[error("Configuração inválida: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

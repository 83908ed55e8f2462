//! # Tokenizador
//!
//! Divide o texto em tokens para o casamento léxico de frases
//! ([`LexicalMatcher`](crate::producer::LexicalMatcher)). Cada token preserva
//! sua posição original no texto (offset de byte), o que permite projetar um
//! casamento de tokens de volta para offsets de caractere.
//!
//! ## Modos
//!
//! - **Words**: fronteiras de palavra Unicode (UAX #29). Pontuação vira token
//!   próprio, espaços são descartados. "Dr. Silva" -> "Dr", ".", "Silva".
//! - **Whitespace**: separa apenas por espaços. "Dr. Silva" -> "Dr.", "Silva".
//! - **CharLevel**: cada caractere não branco é um token.
//!
//! ```rust
//! use annotator_core::tokenizer::{tokenize_with_mode, TokenizerMode};
//!
//! let tokens = tokenize_with_mode("New York, NY", TokenizerMode::Words);
//! let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
//! assert_eq!(texts, vec!["New", "York", ",", "NY"]);
//! ```

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Um token extraído do texto original.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Token {
    /// O texto do token (ex: "York", ",").
    pub text: String,
    /// Índice de byte inicial no texto original (inclusive).
    pub start: usize,
    /// Índice de byte final no texto original (exclusivo).
    pub end: usize,
    /// Índice sequencial do token na lista (0, 1, 2...).
    pub index: usize,
}

/// Estratégias de tokenização disponíveis.
///
/// Frases e texto precisam ser tokenizados com o mesmo modo para que o
/// casamento léxico funcione.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerMode {
    /// **Palavras**: fronteiras de palavra Unicode, pontuação separada.
    #[default]
    Words,
    /// **Espaços**: blocos entre espaços em branco, pontuação colada.
    Whitespace,
    /// **Caractere**: cada caractere não branco é um token.
    CharLevel,
}

/// Tokeniza um texto no modo padrão ([`TokenizerMode::Words`]).
pub fn tokenize(text: &str) -> Vec<Token> {
    tokenize_with_mode(text, TokenizerMode::Words)
}

/// Tokeniza um texto com o modo especificado.
pub fn tokenize_with_mode(text: &str, mode: TokenizerMode) -> Vec<Token> {
    let pieces: Vec<(usize, &str)> = match mode {
        TokenizerMode::Words => text
            .split_word_bound_indices()
            .filter(|(_, w)| !w.trim().is_empty())
            .collect(),
        TokenizerMode::Whitespace => whitespace_pieces(text),
        TokenizerMode::CharLevel => text
            .char_indices()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, c)| (i, &text[i..i + c.len_utf8()]))
            .collect(),
    };

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, (start, piece))| Token {
            text: piece.to_string(),
            start,
            end: start + piece.len(),
            index,
        })
        .collect()
}

fn whitespace_pieces(text: &str) -> Vec<(usize, &str)> {
    let mut pieces = Vec::new();
    let mut current_start: Option<usize> = None;
    for (i, ch) in text.char_indices() {
        match (ch.is_whitespace(), current_start) {
            (true, Some(start)) => {
                pieces.push((start, &text[start..i]));
                current_start = None;
            }
            (false, None) => current_start = Some(i),
            _ => {}
        }
    }
    if let Some(start) = current_start {
        pieces.push((start, &text[start..]));
    }
    pieces
}

//! # Offsets de Byte e de Caractere
//!
//! `regex` e o tokenizador trabalham com offsets de **byte** (índices válidos de
//! `&str`), mas os registros de anotação usam offsets de **caractere**. Em texto
//! ASCII os dois coincidem; com acentos não:
//!
//! ```text
//! "Em São Paulo"
//!  bytes:      E=0 m=1 ' '=2 S=3 ã=4..6 o=6 ...
//!  caracteres: E=0 m=1 ' '=2 S=3 ã=4    o=5 ...
//! ```
//!
//! [`CharOffsets`] indexa o texto uma única vez e converte nos dois sentidos.

/// Mapa entre offsets de byte e de caractere para um texto.
#[derive(Debug, Clone)]
pub struct CharOffsets {
    /// Offset de byte de cada caractere, mais `text.len()` no final.
    byte_of_char: Vec<usize>,
}

impl CharOffsets {
    pub fn new(text: &str) -> Self {
        let mut byte_of_char: Vec<usize> = text.char_indices().map(|(b, _)| b).collect();
        byte_of_char.push(text.len());
        Self { byte_of_char }
    }

    /// Número de caracteres do texto.
    pub fn char_len(&self) -> usize {
        self.byte_of_char.len() - 1
    }

    /// Converte um offset de byte em offset de caractere.
    ///
    /// Retorna `None` se o byte não estiver numa fronteira de caractere.
    pub fn byte_to_char(&self, byte: usize) -> Option<usize> {
        self.byte_of_char.binary_search(&byte).ok()
    }

    /// Converte um offset de caractere em offset de byte (`None` se fora do texto).
    pub fn char_to_byte(&self, char_idx: usize) -> Option<usize> {
        self.byte_of_char.get(char_idx).copied()
    }

    /// Converte um intervalo de bytes `[start, end)` em intervalo de caracteres.
    pub fn byte_range_to_chars(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        Some((self.byte_to_char(start)?, self.byte_to_char(end)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_identity() {
        let offsets = CharOffsets::new("Apple");
        assert_eq!(offsets.char_len(), 5);
        assert_eq!(offsets.byte_range_to_chars(0, 5), Some((0, 5)));
    }

    #[test]
    fn test_multibyte_conversion() {
        let text = "Em São Paulo";
        let offsets = CharOffsets::new(text);
        assert_eq!(offsets.char_len(), 12);
        let byte_start = text.find("Paulo").unwrap();
        assert_eq!(byte_start, 8);
        assert_eq!(offsets.byte_to_char(byte_start), Some(7));
        assert_eq!(offsets.char_to_byte(7), Some(8));
        assert_eq!(offsets.char_to_byte(12), Some(text.len()));
        assert_eq!(offsets.char_to_byte(13), None);
    }

    #[test]
    fn test_byte_inside_char_is_rejected() {
        let offsets = CharOffsets::new("ã");
        assert_eq!(offsets.byte_to_char(1), None);
    }

    #[test]
    fn test_empty_text() {
        let offsets = CharOffsets::new("");
        assert_eq!(offsets.char_len(), 0);
        assert_eq!(offsets.byte_to_char(0), Some(0));
    }
}

//! # Resolvedor de Conflitos entre Spans
//!
//! Os produtores de spans devolvem candidatos que podem se sobrepor: o mesmo
//! trecho pode casar com dois rótulos, ou "Apple" pode aparecer dentro de
//! "Apple and Orange". Uma entidade de NER não pode compartilhar caracteres com
//! outra, então é preciso escolher um subconjunto sem sobreposição.
//!
//! ## Algoritmo (guloso, mais longo primeiro)
//!
//! 1. Ordena os candidatos por comprimento decrescente e, em caso de empate,
//!    por início crescente. A ordenação é estável: candidatos idênticos nas
//!    duas chaves mantêm a ordem de entrada.
//! 2. Percorre os candidatos mantendo o conjunto de offsets já cobertos.
//! 3. Aceita o candidato se nem `start` nem `end - 1` estiverem cobertos.
//! 4. Aceito ou não, todo offset de `[start, end)` passa a ser coberto.
//!
//! O passo 4 é observável: um candidato rejeitado continua bloqueando os
//! candidatos mais curtos que encostam nele.
//!
//! ```text
//! candidatos: (0,5,A) (4,9,B) (6,8,C)
//! ordem:      (0,5,A) (4,9,B) (6,8,C)
//! (0,5,A) aceito       cobertos = 0..5
//! (4,9,B) rejeitado    cobertos = 0..9   (4 já estava coberto)
//! (6,8,C) rejeitado    (6 coberto por B)
//! ```
//!
//! Spans degenerados (`end <= start`) nunca colidem e nunca aparecem na saída.

use std::collections::HashSet;

use tracing::debug;

use crate::span::Span;

/// Seleciona um subconjunto sem sobreposição, preferindo spans mais longos.
///
/// A saída segue a ordem de prioridade (comprimento decrescente, início
/// crescente), não a ordem de posição no texto. Use
/// [`sort_by_position`](crate::span::sort_by_position) quando precisar dela.
///
/// # Exemplo
/// ```rust
/// use annotator_core::{resolve, Span};
///
/// let spans = vec![Span::new(2, 4, "Y"), Span::new(0, 10, "X")];
/// assert_eq!(resolve(spans), vec![Span::new(0, 10, "X")]);
/// ```
pub fn resolve<L>(spans: impl IntoIterator<Item = Span<L>>) -> Vec<Span<L>> {
    let mut candidates: Vec<Span<L>> = spans
        .into_iter()
        .filter(|s| !s.is_degenerate())
        .collect();
    let total = candidates.len();

    // sort_by é estável: a ordem de entrada desempata o que sobrar
    candidates.sort_by(|a, b| b.len().cmp(&a.len()).then(a.start.cmp(&b.start)));

    let mut covered: HashSet<usize> = HashSet::new();
    let mut accepted = Vec::new();
    for span in candidates {
        let free = !covered.contains(&span.start) && !covered.contains(&(span.end - 1));
        covered.extend(span.start..span.end);
        if free {
            accepted.push(span);
        }
    }

    debug!(
        candidates = total,
        accepted = accepted.len(),
        "spans resolvidos"
    );
    accepted
}

/// Verifica se nenhum par de spans compartilha offsets.
pub fn is_non_overlapping<L>(spans: &[Span<L>]) -> bool {
    let mut ordered: Vec<&Span<L>> = spans.iter().filter(|s| !s.is_degenerate()).collect();
    ordered.sort_by_key(|s| s.start);
    ordered.windows(2).all(|w| !w[0].overlaps(w[1]))
}

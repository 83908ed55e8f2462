//! # Amostragem dos Exemplos
//!
//! Antes da sessão, o conjunto de exemplos pode ser reduzido a uma amostra:
//!
//! - **Fração simples**: sorteia `round(total * fraction)` exemplos.
//! - **Estratificada**: cada exemplo pertence a um grupo (`Example::group`) e a
//!   amostra respeita a proporção pedida para cada grupo. De um grupo com
//!   proporção `p` são sorteados `round(total * fraction * p)` exemplos.
//!
//! Com `seed` definido a amostragem é reprodutível.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AnnotatorError, Result};

/// Tolerância na soma das proporções dos estratos.
const PROPORTION_EPSILON: f64 = 1e-9;

/// Um texto a ser anotado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    /// Categoria usada na amostragem estratificada.
    #[serde(default)]
    pub group: Option<String>,
}

impl Example {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            group: None,
        }
    }

    pub fn with_group(text: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            group: Some(group.into()),
        }
    }
}

/// Lê exemplos de um arquivo.
///
/// Arquivos `.jsonl` têm um [`Example`] JSON por linha; qualquer outro
/// arquivo é lido como texto, um exemplo por linha. Linhas em branco são
/// ignoradas.
pub fn load_examples(path: impl AsRef<Path>) -> Result<Vec<Example>> {
    let path = path.as_ref();
    let jsonl = path.extension().is_some_and(|ext| ext == "jsonl");
    let examples = read_examples(File::open(path)?, jsonl)?;
    debug!(path = %path.display(), examples = examples.len(), "exemplos carregados");
    Ok(examples)
}

/// Lê exemplos de um leitor: JSONL (`jsonl = true`) ou texto por linha.
pub fn read_examples<R: Read>(reader: R, jsonl: bool) -> Result<Vec<Example>> {
    let mut examples = Vec::new();
    for line in BufReader::new(reader).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if jsonl {
            examples.push(serde_json::from_str(&line)?);
        } else {
            examples.push(Example::new(line));
        }
    }
    Ok(examples)
}

/// Opções de amostragem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleOptions {
    /// Fração do total a amostrar, em `(0, 1]`.
    pub fraction: f64,
    /// Embaralha a amostra.
    pub shuffle: bool,
    /// Proporção de cada grupo na amostra (a soma deve ser 1).
    pub strata: Option<BTreeMap<String, f64>>,
    /// Semente para amostragem reprodutível.
    pub seed: Option<u64>,
}

impl Default for SampleOptions {
    fn default() -> Self {
        Self {
            fraction: 1.0,
            shuffle: false,
            strata: None,
            seed: None,
        }
    }
}

/// Sorteia a amostra de exemplos a anotar.
///
/// Devolve os índices sorteados na lista original, na ordem da amostra. A
/// sessão guarda esses índices para que cada registro fique preso ao seu
/// exemplo de origem, qualquer que seja a amostra.
pub fn sample_indices(examples: &[Example], options: &SampleOptions) -> Result<Vec<usize>> {
    if !(options.fraction > 0.0 && options.fraction <= 1.0) {
        return Err(AnnotatorError::InvalidSample(format!(
            "fração {} fora de (0, 1]",
            options.fraction
        )));
    }
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let total = examples.len();

    let sample = if let Some(strata) = &options.strata {
        let sum: f64 = strata.values().sum();
        if (sum - 1.0).abs() > PROPORTION_EPSILON {
            return Err(AnnotatorError::InvalidSample(format!(
                "a soma das proporções dos estratos é {sum}, deveria ser 1"
            )));
        }

        let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, example) in examples.iter().enumerate() {
            if let Some(group) = &example.group {
                groups.entry(group.as_str()).or_default().push(i);
            }
        }

        let mut sample = Vec::new();
        for (group, proportion) in strata {
            let members = groups.remove(group.as_str()).ok_or_else(|| {
                AnnotatorError::InvalidSample(format!("estrato '{group}' sem exemplos"))
            })?;
            let wanted = (total as f64 * options.fraction * proportion).round() as usize;
            if wanted > members.len() {
                return Err(AnnotatorError::InvalidSample(format!(
                    "estrato '{group}' pede {wanted} exemplos mas tem {}",
                    members.len()
                )));
            }
            debug!(group = %group, wanted, available = members.len(), "estrato amostrado");
            sample.extend(members.choose_multiple(&mut rng, wanted).copied());
        }
        if options.shuffle {
            sample.shuffle(&mut rng);
        }
        sample
    } else if options.fraction < 1.0 || options.shuffle {
        let wanted = (total as f64 * options.fraction).round() as usize;
        let all: Vec<usize> = (0..total).collect();
        // choose_multiple não garante ordem aleatória; embaralha sempre
        let mut sample: Vec<usize> = all.choose_multiple(&mut rng, wanted).copied().collect();
        sample.shuffle(&mut rng);
        sample
    } else {
        (0..total).collect()
    };

    debug!(total, sampled = sample.len(), "amostra sorteada");
    Ok(sample)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw(examples: Vec<Example>, options: &SampleOptions) -> Result<Vec<Example>> {
        let picks = sample_indices(&examples, options)?;
        Ok(picks.into_iter().map(|i| examples[i].clone()).collect())
    }

    fn examples(n: usize) -> Vec<Example> {
        (0..n).map(|i| Example::new(format!("texto {i}"))).collect()
    }

    fn grouped() -> Vec<Example> {
        let mut out = Vec::new();
        for i in 0..6 {
            out.push(Example::with_group(format!("a{i}"), "A"));
        }
        for i in 0..4 {
            out.push(Example::with_group(format!("b{i}"), "B"));
        }
        out
    }

    #[test]
    fn test_read_examples_plain_and_jsonl() {
        let plain = read_examples("primeiro\n\n segundo \n".as_bytes(), false).unwrap();
        assert_eq!(plain, vec![Example::new("primeiro"), Example::new(" segundo ")]);

        let jsonl = "{\"text\": \"a\", \"group\": \"A\"}\n{\"text\": \"b\"}\n";
        let parsed = read_examples(jsonl.as_bytes(), true).unwrap();
        assert_eq!(parsed, vec![Example::with_group("a", "A"), Example::new("b")]);
    }

    #[test]
    fn test_default_keeps_everything_in_order() {
        let input = examples(5);
        let out = draw(input.clone(), &SampleOptions::default()).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_fraction_sample_size() {
        let options = SampleOptions {
            fraction: 0.3,
            seed: Some(7),
            ..Default::default()
        };
        let out = draw(examples(10), &options).unwrap();
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let options = SampleOptions {
            fraction: 0.5,
            shuffle: true,
            seed: Some(42),
            ..Default::default()
        };
        let a = draw(examples(20), &options).unwrap();
        let b = draw(examples(20), &options).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_shuffle_keeps_all_examples() {
        let options = SampleOptions {
            shuffle: true,
            seed: Some(1),
            ..Default::default()
        };
        let mut out = draw(examples(8), &options).unwrap();
        out.sort_by(|a, b| a.text.cmp(&b.text));
        let mut expected = examples(8);
        expected.sort_by(|a, b| a.text.cmp(&b.text));
        assert_eq!(out, expected);
    }

    #[test]
    fn test_invalid_fraction() {
        for fraction in [0.0, -0.5, 1.5] {
            let options = SampleOptions {
                fraction,
                ..Default::default()
            };
            assert!(draw(examples(3), &options).is_err());
        }
    }

    #[test]
    fn test_strata_proportions() {
        let options = SampleOptions {
            fraction: 0.5,
            strata: Some(BTreeMap::from([("A".to_string(), 0.6), ("B".to_string(), 0.4)])),
            seed: Some(3),
            ..Default::default()
        };
        let out = draw(grouped(), &options).unwrap();
        let a = out.iter().filter(|e| e.group.as_deref() == Some("A")).count();
        let b = out.iter().filter(|e| e.group.as_deref() == Some("B")).count();
        assert_eq!((a, b), (3, 2));
    }

    #[test]
    fn test_strata_must_sum_to_one() {
        let options = SampleOptions {
            strata: Some(BTreeMap::from([("A".to_string(), 0.6), ("B".to_string(), 0.6)])),
            ..Default::default()
        };
        let err = draw(grouped(), &options).unwrap_err();
        assert!(matches!(err, AnnotatorError::InvalidSample(_)));
    }

    #[test]
    fn test_stratum_too_small() {
        let options = SampleOptions {
            strata: Some(BTreeMap::from([("A".to_string(), 0.2), ("B".to_string(), 0.8)])),
            ..Default::default()
        };
        // B pede 8 exemplos e só tem 4
        assert!(draw(grouped(), &options).is_err());
    }

    #[test]
    fn test_unknown_stratum() {
        let options = SampleOptions {
            strata: Some(BTreeMap::from([("A".to_string(), 0.5), ("C".to_string(), 0.5)])),
            ..Default::default()
        };
        assert!(draw(grouped(), &options).is_err());
    }

    #[test]
    fn test_sample_indices_are_distinct_and_in_range() {
        let options = SampleOptions {
            fraction: 0.5,
            shuffle: true,
            seed: Some(9),
            ..Default::default()
        };
        let mut picks = sample_indices(&examples(10), &options).unwrap();
        assert_eq!(picks.len(), 5);
        picks.sort();
        picks.dedup();
        assert_eq!(picks.len(), 5);
        assert!(picks.iter().all(|&i| i < 10));
    }
}

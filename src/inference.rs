//! Sentiment inference stage.
//!
//! Each flushed element is tokenized into a fixed-length encoding, handed
//! to the classifier collaborator, and its two unnormalized scores are
//! converted to probabilities with a softmax. Index 1 maps to POSITIVE,
//! anything else to NEGATIVE; confidence is the selected probability.
//!
//! The classifier is a black box behind the `Classifier` trait. A failed
//! element is skipped and reported; it never aborts the rest of the batch.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;
use tracing::warn;

use crate::emit;
use crate::error::{
    EmptyVocabSnafu, InferenceError, ScoreShapeSnafu, VocabReadSnafu, WeightsParseSnafu,
    WeightsReadSnafu, WeightsShapeSnafu,
};
use crate::metrics::events::{ElementFailed, FailureStage, InferenceCompleted};

/// Fixed token sequence length (pad or truncate to this).
pub const MAX_SEQ_LEN: usize = 128;

/// Number of sentiment classes.
pub const NUM_CLASSES: usize = 2;

/// Reserved vocabulary ids.
const PAD_ID: u32 = 0;
const UNK_ID: u32 = 1;
const RESERVED_IDS: u32 = 2;

/// Fixed-length token encoding of one text element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEncoding {
    /// Token ids, always exactly `MAX_SEQ_LEN` long.
    pub ids: Vec<u32>,
    /// Number of non-padding positions.
    pub len: usize,
}

/// Sentiment label for a classified element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    Positive,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "POSITIVE",
            Sentiment::Negative => "NEGATIVE",
        }
    }
}

/// Classification result for one text element.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub text: String,
    pub sentiment: Sentiment,
    pub confidence: f64,
}

/// Word-level tokenizer with a fixed vocabulary.
///
/// Lowercases, splits on non-alphanumeric characters, maps unknown words
/// to the UNK id, and pads/truncates to `MAX_SEQ_LEN`.
#[derive(Debug)]
pub struct Tokenizer {
    vocab: HashMap<String, u32>,
}

impl Tokenizer {
    /// Load the vocabulary from a file with one token per line.
    ///
    /// Ids are assigned by line order, offset past the reserved PAD and
    /// UNK ids.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path_str = path.as_ref().display().to_string();
        let content = std::fs::read_to_string(path.as_ref()).context(VocabReadSnafu {
            path: path_str.clone(),
        })?;

        let mut vocab = HashMap::new();
        for (index, token) in content
            .lines()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .enumerate()
        {
            vocab
                .entry(token.to_lowercase())
                .or_insert(index as u32 + RESERVED_IDS);
        }
        ensure!(!vocab.is_empty(), EmptyVocabSnafu { path: path_str });
        Ok(Self { vocab })
    }

    /// Number of ids the vocabulary spans, reserved ids included.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len() + RESERVED_IDS as usize
    }

    /// Encode a text into a fixed-length id sequence.
    pub fn encode(&self, text: &str) -> TokenEncoding {
        let mut ids: Vec<u32> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|word| self.vocab.get(word).copied().unwrap_or(UNK_ID))
            .take(MAX_SEQ_LEN)
            .collect();

        let len = ids.len();
        ids.resize(MAX_SEQ_LEN, PAD_ID);
        TokenEncoding { ids, len }
    }
}

/// Classifier collaborator: encoding in, unnormalized class scores out.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, encoding: &TokenEncoding) -> Result<Vec<f32>, InferenceError>;
}

/// Serialized weight file for [`LinearClassifier`].
#[derive(Debug, Serialize, Deserialize)]
struct WeightFile {
    /// One row of `NUM_CLASSES` weights per vocabulary id.
    weights: Vec<[f32; NUM_CLASSES]>,
    /// Per-class bias.
    #[serde(default)]
    bias: [f32; NUM_CLASSES],
}

/// Linear bag-of-tokens classifier loaded from a JSON weight matrix.
///
/// Scores are the sum of each non-padding token's weight row plus bias.
#[derive(Debug)]
pub struct LinearClassifier {
    weights: Vec<[f32; NUM_CLASSES]>,
    bias: [f32; NUM_CLASSES],
}

impl LinearClassifier {
    /// Load weights, checking that the matrix covers the vocabulary.
    pub fn from_file(
        path: impl AsRef<Path>,
        vocab_size: usize,
    ) -> Result<Self, InferenceError> {
        let path_str = path.as_ref().display().to_string();
        let content =
            std::fs::read_to_string(path.as_ref()).context(WeightsReadSnafu { path: path_str })?;
        let file: WeightFile = serde_json::from_str(&content).context(WeightsParseSnafu)?;
        ensure!(
            file.weights.len() >= vocab_size,
            WeightsShapeSnafu {
                expected: vocab_size,
                actual: file.weights.len(),
            }
        );
        Ok(Self {
            weights: file.weights,
            bias: file.bias,
        })
    }
}

#[async_trait]
impl Classifier for LinearClassifier {
    async fn classify(&self, encoding: &TokenEncoding) -> Result<Vec<f32>, InferenceError> {
        let mut scores = self.bias;
        for &id in &encoding.ids[..encoding.len] {
            if let Some(row) = self.weights.get(id as usize) {
                for (score, weight) in scores.iter_mut().zip(row) {
                    *score += weight;
                }
            }
        }
        Ok(scores.to_vec())
    }
}

/// Numerically stable softmax over raw scores.
pub fn softmax(scores: &[f32]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max) as f64;
    let exps: Vec<f64> = scores.iter().map(|&s| (s as f64 - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Interpret raw scores into a sentiment label and confidence.
///
/// Index 1 maps to POSITIVE, any other index to NEGATIVE; confidence is
/// the softmax probability of the selected class.
pub fn interpret(scores: &[f32]) -> Result<(Sentiment, f64), InferenceError> {
    ensure!(
        scores.len() == NUM_CLASSES,
        ScoreShapeSnafu {
            expected: NUM_CLASSES,
            actual: scores.len(),
        }
    );
    let probs = softmax(scores);
    let (index, confidence) = probs
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap_or((0, 0.0));
    let sentiment = if index == 1 {
        Sentiment::Positive
    } else {
        Sentiment::Negative
    };
    Ok((sentiment, confidence))
}

/// Per-element classification over flushed window batches.
pub struct InferenceStage {
    tokenizer: Tokenizer,
    classifier: std::sync::Arc<dyn Classifier>,
}

impl InferenceStage {
    pub fn new(tokenizer: Tokenizer, classifier: std::sync::Arc<dyn Classifier>) -> Self {
        Self {
            tokenizer,
            classifier,
        }
    }

    /// Classify one element.
    pub async fn classify_one(&self, text: &str) -> Result<ClassificationResult, InferenceError> {
        let encoding = self.tokenizer.encode(text);
        let start = Instant::now();
        let scores = self.classifier.classify(&encoding).await?;
        emit!(InferenceCompleted {
            duration: start.elapsed()
        });
        let (sentiment, confidence) = interpret(&scores)?;
        Ok(ClassificationResult {
            text: text.to_string(),
            sentiment,
            confidence,
        })
    }

    /// Classify a flushed batch, skipping elements that fail.
    ///
    /// Returns the successful results plus the number of skipped elements.
    pub async fn process_batch(&self, elements: &[String]) -> (Vec<ClassificationResult>, usize) {
        let mut results = Vec::with_capacity(elements.len());
        let mut failed = 0usize;
        for text in elements {
            match self.classify_one(text).await {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("Skipping element that failed classification: {e}");
                    emit!(ElementFailed {
                        stage: FailureStage::Classify
                    });
                    failed += 1;
                }
            }
        }
        (results, failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::NamedTempFile;

    fn vocab_file(tokens: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for token in tokens {
            writeln!(file, "{token}").unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_encode_pads_to_fixed_length() {
        let file = vocab_file(&["love", "this"]);
        let tokenizer = Tokenizer::from_file(file.path()).unwrap();
        let encoding = tokenizer.encode("I love this");
        assert_eq!(encoding.ids.len(), MAX_SEQ_LEN);
        assert_eq!(encoding.len, 3);
        // "i" is unknown; "love" and "this" got ids past the reserved range.
        assert_eq!(encoding.ids[0], 1);
        assert_eq!(encoding.ids[1], 2);
        assert_eq!(encoding.ids[2], 3);
        assert!(encoding.ids[3..].iter().all(|&id| id == 0));
    }

    #[test]
    fn test_encode_truncates_long_input() {
        let file = vocab_file(&["word"]);
        let tokenizer = Tokenizer::from_file(file.path()).unwrap();
        let text = vec!["word"; MAX_SEQ_LEN + 50].join(" ");
        let encoding = tokenizer.encode(&text);
        assert_eq!(encoding.ids.len(), MAX_SEQ_LEN);
        assert_eq!(encoding.len, MAX_SEQ_LEN);
    }

    #[test]
    fn test_empty_vocab_rejected() {
        let file = vocab_file(&[]);
        let err = Tokenizer::from_file(file.path()).unwrap_err();
        assert!(matches!(err, InferenceError::EmptyVocab { .. }));
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.5, -0.5]);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(probs[0] > probs[1]);
    }

    #[test]
    fn test_interpret_positive_when_second_score_wins() {
        let (sentiment, confidence) = interpret(&[0.2, 1.8]).unwrap();
        assert_eq!(sentiment, Sentiment::Positive);
        let expected = softmax(&[0.2, 1.8])[1];
        assert!((confidence - expected).abs() < 1e-9);
        assert!(confidence > 0.5 && confidence <= 1.0);
    }

    #[test]
    fn test_interpret_negative_when_first_score_wins() {
        let (sentiment, confidence) = interpret(&[2.0, -1.0]).unwrap();
        assert_eq!(sentiment, Sentiment::Negative);
        let expected = softmax(&[2.0, -1.0])[0];
        assert!((confidence - expected).abs() < 1e-9);
    }

    #[test]
    fn test_interpret_rejects_wrong_shape() {
        let err = interpret(&[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(err, InferenceError::ScoreShape { actual: 3, .. }));
    }

    fn weights_file(rows: &[[f32; 2]]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let json = serde_json::json!({ "weights": rows, "bias": [0.0, 0.0] });
        write!(file, "{json}").unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_linear_classifier_end_to_end() {
        let vocab = vocab_file(&["love", "terrible"]);
        let tokenizer = Tokenizer::from_file(vocab.path()).unwrap();
        // Rows: PAD, UNK, "love" (positive), "terrible" (negative).
        let weights = weights_file(&[[0.0, 0.0], [0.0, 0.0], [-1.0, 2.0], [2.0, -1.0]]);
        let classifier =
            LinearClassifier::from_file(weights.path(), tokenizer.vocab_size()).unwrap();
        let stage = InferenceStage::new(tokenizer, Arc::new(classifier));

        let result = stage.classify_one("I love this").await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Positive);
        assert!(result.confidence > 0.5 && result.confidence <= 1.0);

        let result = stage.classify_one("this is terrible").await.unwrap();
        assert_eq!(result.sentiment, Sentiment::Negative);
    }

    #[test]
    fn test_linear_classifier_rejects_short_matrix() {
        let weights = weights_file(&[[0.0, 0.0]]);
        let err = LinearClassifier::from_file(weights.path(), 4).unwrap_err();
        assert!(matches!(err, InferenceError::WeightsShape { .. }));
    }

    struct FailingClassifier;

    #[async_trait]
    impl Classifier for FailingClassifier {
        async fn classify(&self, encoding: &TokenEncoding) -> Result<Vec<f32>, InferenceError> {
            if encoding.len == 0 {
                // Wrong shape stands in for an arbitrary model failure.
                Ok(vec![])
            } else {
                Ok(vec![0.0, 1.0])
            }
        }
    }

    #[tokio::test]
    async fn test_batch_skips_failed_elements() {
        let vocab = vocab_file(&["ok"]);
        let tokenizer = Tokenizer::from_file(vocab.path()).unwrap();
        let stage = InferenceStage::new(tokenizer, Arc::new(FailingClassifier));

        let elements = vec!["ok".to_string(), "!!!".to_string(), "ok".to_string()];
        let (results, failed) = stage.process_batch(&elements).await;
        assert_eq!(results.len(), 2);
        assert_eq!(failed, 1);
        assert!(results.iter().all(|r| r.sentiment == Sentiment::Positive));
    }
}

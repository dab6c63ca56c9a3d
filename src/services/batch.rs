use tracing::{debug, warn};

use crate::error::EmbeddingError;
use crate::models::{Embedding, Record};
use crate::services::EmbeddingService;
use crate::utils::{RetryConfig, RetryResult, with_retry};

/// How a batch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchStatus {
    /// Every valid record received a vector.
    Embedded,
    /// No record had text; nothing was sent.
    Skipped,
    /// Retries ran out; every record of the batch is absent.
    Degraded { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub valid: usize,
    pub invalid: usize,
    /// Remote calls made for this batch.
    pub attempts: u32,
    pub status: BatchStatus,
}

/// Embed one batch in place.
///
/// Records without text get [`Embedding::Absent`] and are left out of the request. The
/// remaining texts go out as a single request, retried as a whole under `retry`. A response
/// with the wrong number of vectors, or vectors of the wrong length, counts as a failed attempt.
pub async fn process_batch<S>(
    service: &S,
    retry: &RetryConfig,
    batch: &mut [Record],
    expected_dimension: Option<usize>,
) -> BatchOutcome
where
    S: EmbeddingService + ?Sized,
{
    let mut valid_idx = Vec::with_capacity(batch.len());
    let mut texts = Vec::with_capacity(batch.len());
    for (idx, record) in batch.iter_mut().enumerate() {
        match record.embeddable_text() {
            Some(text) => {
                texts.push(text.to_string());
                valid_idx.push(idx);
            }
            None => record.embedding = Embedding::Absent,
        }
    }

    let invalid = batch.len() - valid_idx.len();
    if texts.is_empty() {
        return BatchOutcome {
            valid: 0,
            invalid,
            attempts: 0,
            status: BatchStatus::Skipped,
        };
    }

    let result = with_retry(retry, || async {
        let vectors = service.embed(&texts).await?;
        check_shape(&vectors, texts.len(), expected_dimension)?;
        Ok::<_, EmbeddingError>(vectors)
    })
    .await;

    let attempts = result.attempts();
    let status = match result {
        RetryResult::Success { value, .. } => {
            for (idx, vector) in valid_idx.iter().zip(value) {
                batch[*idx].embedding = Embedding::Vector(vector);
            }
            debug!(valid = texts.len(), invalid, attempts, "batch embedded");
            BatchStatus::Embedded
        }
        RetryResult::Failed { last_error, .. } => {
            for record in batch.iter_mut() {
                record.embedding = Embedding::Absent;
            }
            let first = batch.first().map_or(0, |r| r.id);
            warn!(
                first_id = first,
                records = batch.len(),
                attempts,
                "batch failed, marking records absent: {last_error}"
            );
            BatchStatus::Degraded {
                error: last_error.to_string(),
            }
        }
    };

    BatchOutcome {
        valid: texts.len(),
        invalid,
        attempts,
        status,
    }
}

fn check_shape(
    vectors: &[Vec<f32>],
    want: usize,
    expected_dimension: Option<usize>,
) -> Result<(), EmbeddingError> {
    if vectors.len() != want {
        return Err(EmbeddingError::CountMismatch {
            got: vectors.len(),
            want,
        });
    }

    let Some(dimension) = expected_dimension.or_else(|| vectors.first().map(Vec::len)) else {
        return Ok(());
    };
    for vector in vectors {
        if vector.len() != dimension || vector.is_empty() {
            return Err(EmbeddingError::DimensionMismatch {
                got: vector.len(),
                want: dimension,
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbeddingError::InvalidResponse(
                "embedding contains non-finite values".into(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays canned responses, one per call.
    struct Scripted {
        responses: Mutex<Vec<Result<Vec<Vec<f32>>, EmbeddingError>>>,
        calls: Mutex<Vec<Vec<String>>>,
    }

    impl Scripted {
        fn new(mut responses: Vec<Result<Vec<Vec<f32>>, EmbeddingError>>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EmbeddingService for Scripted {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            self.calls.lock().unwrap().push(texts.to_vec());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Err(EmbeddingError::ServerError("script exhausted".into())))
        }

        fn model(&self) -> &str {
            "scripted"
        }
    }

    fn retry() -> RetryConfig {
        RetryConfig::new(3).with_initial_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_invalid_records_skip_request() {
        let service = Scripted::new(vec![Ok(vec![vec![1.0, 2.0]])]);
        let mut batch = vec![Record::new(0, ""), Record::new(1, "kept"), Record::new(2, "  ")];
        batch[0].text = None;

        let outcome = process_batch(&service, &retry(), &mut batch, None).await;

        assert_eq!(outcome.status, BatchStatus::Embedded);
        assert_eq!(outcome.valid, 1);
        assert_eq!(outcome.invalid, 2);
        assert_eq!(service.calls(), vec![vec!["kept".to_string()]]);
        assert_eq!(batch[0].embedding, Embedding::Absent);
        assert_eq!(batch[1].embedding, Embedding::Vector(vec![1.0, 2.0]));
        assert_eq!(batch[2].embedding, Embedding::Absent);
    }

    #[tokio::test]
    async fn test_all_empty_batch_makes_no_call() {
        let service = Scripted::new(vec![]);
        let mut batch = vec![Record::new(0, ""), Record::new(1, "")];

        let outcome = process_batch(&service, &retry(), &mut batch, None).await;

        assert_eq!(outcome.status, BatchStatus::Skipped);
        assert_eq!(outcome.attempts, 0);
        assert!(service.calls().is_empty());
        assert!(batch.iter().all(|r| r.embedding.is_absent()));
    }

    #[tokio::test]
    async fn test_count_mismatch_is_retried() {
        let service = Scripted::new(vec![
            Ok(vec![vec![1.0]]),
            Ok(vec![vec![1.0], vec![2.0]]),
        ]);
        let mut batch = vec![Record::new(0, "a"), Record::new(1, "b")];

        let outcome = process_batch(&service, &retry(), &mut batch, None).await;

        assert_eq!(outcome.status, BatchStatus::Embedded);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(batch[1].embedding, Embedding::Vector(vec![2.0]));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_degrades() {
        let wrong = || -> Result<Vec<Vec<f32>>, EmbeddingError> { Ok(vec![vec![1.0, 2.0, 3.0]]) };
        let service = Scripted::new(vec![wrong(), wrong(), wrong()]);
        let mut batch = vec![Record::new(0, "a"), Record::new(1, "")];

        let outcome = process_batch(&service, &retry(), &mut batch, Some(2)).await;

        assert_eq!(outcome.attempts, 3);
        assert!(matches!(outcome.status, BatchStatus::Degraded { .. }));
        assert!(batch.iter().all(|r| r.embedding.is_absent()));
    }

    #[tokio::test]
    async fn test_ragged_vectors_rejected() {
        let service = Scripted::new(vec![
            Ok(vec![vec![1.0, 2.0], vec![3.0]]),
            Ok(vec![vec![1.0, 2.0], vec![3.0, 4.0]]),
        ]);
        let mut batch = vec![Record::new(0, "a"), Record::new(1, "b")];

        let outcome = process_batch(&service, &retry(), &mut batch, None).await;

        assert_eq!(outcome.attempts, 2);
        assert_eq!(batch[1].embedding, Embedding::Vector(vec![3.0, 4.0]));
    }

    #[test]
    fn test_check_shape_non_finite() {
        let err = check_shape(&[vec![f32::NAN]], 1, None).unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
    }
}

//! Records flowing through the pipeline and the state derived from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Embedding slot of a record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "vector", rename_all = "snake_case")]
pub enum Embedding {
    /// Not attempted yet.
    #[default]
    Pending,
    /// No embedding could be produced; downstream stages exclude the row.
    Absent,
    /// Vector returned by the embedding service.
    Vector(Vec<f32>),
}

impl Embedding {
    pub fn is_pending(&self) -> bool {
        matches!(self, Embedding::Pending)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Embedding::Absent)
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Embedding::Vector(v) => Some(v),
            _ => None,
        }
    }
}

/// One input row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Position in the input, starting at 0.
    pub id: usize,

    pub text: Option<String>,

    /// Remaining input columns, carried through to the output untouched.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub embedding: Embedding,
}

impl Record {
    pub fn new(id: usize, text: impl Into<String>) -> Self {
        Self {
            id,
            text: Some(text.into()),
            fields: BTreeMap::new(),
            embedding: Embedding::Pending,
        }
    }

    /// Text to send to the embedding service, or `None` when it is missing or blank.
    pub fn embeddable_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Index of the first record still to process.
///
/// One past the last record holding a vector. Batches complete strictly in order, so every
/// record before that point has already been through a batch. A pending record before the
/// point can only come from an edited checkpoint; the cursor then moves back to it.
pub fn resume_point(records: &[Record]) -> usize {
    let after_last_vector = records
        .iter()
        .rposition(|r| r.embedding.as_vector().is_some())
        .map_or(0, |i| i + 1);
    let first_pending = records
        .iter()
        .position(|r| r.embedding.is_pending())
        .unwrap_or(records.len());
    after_last_vector.min(first_pending)
}

/// Length of the first vector in the collection, if any.
pub fn observed_dimension(records: &[Record]) -> Option<usize> {
    records
        .iter()
        .find_map(|r| r.embedding.as_vector().map(<[f32]>::len))
}

/// Counters derived from a record collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunState {
    pub total: usize,
    pub next_index: usize,
    pub embedded: usize,
    pub absent: usize,
    pub pending: usize,
}

impl RunState {
    pub fn from_records(records: &[Record]) -> Self {
        let mut state = RunState {
            total: records.len(),
            next_index: resume_point(records),
            ..Default::default()
        };
        for record in records {
            match record.embedding {
                Embedding::Pending => state.pending += 1,
                Embedding::Absent => state.absent += 1,
                Embedding::Vector(_) => state.embedded += 1,
            }
        }
        state
    }

    pub fn is_complete(&self) -> bool {
        self.pending == 0 && self.next_index >= self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_embedding(id: usize, embedding: Embedding) -> Record {
        Record {
            embedding,
            ..Record::new(id, format!("text {id}"))
        }
    }

    #[test]
    fn test_embeddable_text() {
        assert_eq!(Record::new(0, "hello").embeddable_text(), Some("hello"));
        assert_eq!(Record::new(0, "").embeddable_text(), None);
        assert_eq!(Record::new(0, "  \n").embeddable_text(), None);

        let mut missing = Record::new(0, "x");
        missing.text = None;
        assert_eq!(missing.embeddable_text(), None);
    }

    #[test]
    fn test_resume_point_fresh() {
        let records: Vec<Record> = (0..5).map(|i| Record::new(i, "t")).collect();
        assert_eq!(resume_point(&records), 0);
        assert_eq!(resume_point(&[]), 0);
    }

    #[test]
    fn test_resume_point_after_last_vector() {
        let records = vec![
            with_embedding(0, Embedding::Vector(vec![0.1])),
            with_embedding(1, Embedding::Absent),
            with_embedding(2, Embedding::Vector(vec![0.2])),
            with_embedding(3, Embedding::Pending),
            with_embedding(4, Embedding::Pending),
        ];
        assert_eq!(resume_point(&records), 3);
    }

    #[test]
    fn test_resume_point_retries_trailing_absent() {
        let records = vec![
            with_embedding(0, Embedding::Vector(vec![0.1])),
            with_embedding(1, Embedding::Absent),
            with_embedding(2, Embedding::Absent),
        ];
        assert_eq!(resume_point(&records), 1);
    }

    #[test]
    fn test_resume_point_only_absent() {
        let records = vec![
            with_embedding(0, Embedding::Absent),
            with_embedding(1, Embedding::Pending),
        ];
        assert_eq!(resume_point(&records), 0);
    }

    #[test]
    fn test_resume_point_pending_gap() {
        let records = vec![
            with_embedding(0, Embedding::Vector(vec![0.1])),
            with_embedding(1, Embedding::Pending),
            with_embedding(2, Embedding::Vector(vec![0.2])),
        ];
        assert_eq!(resume_point(&records), 1);
    }

    #[test]
    fn test_run_state_counts() {
        let records = vec![
            with_embedding(0, Embedding::Vector(vec![0.1, 0.2])),
            with_embedding(1, Embedding::Absent),
            with_embedding(2, Embedding::Pending),
        ];
        let state = RunState::from_records(&records);
        assert_eq!(
            state,
            RunState {
                total: 3,
                next_index: 1,
                embedded: 1,
                absent: 1,
                pending: 1,
            }
        );
        assert!(!state.is_complete());
        assert_eq!(observed_dimension(&records), Some(2));
    }

    #[test]
    fn test_embedding_serde_shape() {
        let json = serde_json::to_string(&Embedding::Vector(vec![1.0])).unwrap();
        assert_eq!(json, r#"{"status":"vector","vector":[1.0]}"#);
        let json = serde_json::to_string(&Embedding::Absent).unwrap();
        assert_eq!(json, r#"{"status":"absent"}"#);
        let back: Embedding = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(back, Embedding::Pending);
    }
}

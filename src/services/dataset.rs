//! Reading input tables and writing the embedded output artifact.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::DatasetError;
use crate::models::{DataFormat, Embedding, Record};
use crate::utils::write_atomic;

/// Output keys owned by the pipeline. Input columns with these names are renamed.
const RESERVED_COLUMNS: [&str; 3] = ["id", "text", "embedding"];

/// Read records from `path` (`-` for stdin), taking text from `text_column`.
///
/// The format follows the file extension; stdin is read as JSON or JSONL.
pub fn load_records(path: &Path, text_column: &str) -> Result<Vec<Record>, DatasetError> {
    if path.as_os_str() == "-" {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        return parse_json_records(&input, text_column);
    }

    let format = DataFormat::from_path(path)
        .ok_or_else(|| DatasetError::UnsupportedFormat(path.display().to_string()))?;

    let records = match format {
        DataFormat::Csv => {
            let file = std::fs::File::open(path)?;
            parse_csv_records(file, text_column)?
        }
        DataFormat::Json | DataFormat::Jsonl => {
            let input = std::fs::read_to_string(path)?;
            parse_json_records(&input, text_column)?
        }
    };

    debug!(path = %path.display(), %format, records = records.len(), "loaded input");
    Ok(records)
}

/// Parse a CSV table with a header row. Empty cells in the text column count as missing.
pub fn parse_csv_records<R: Read>(reader: R, text_column: &str) -> Result<Vec<Record>, DatasetError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();
    let text_idx = headers
        .iter()
        .position(|h| h == text_column)
        .ok_or_else(|| DatasetError::MissingColumn(text_column.to_string()))?;

    let mut records = Vec::new();
    for (id, row) in reader.records().enumerate() {
        let row = row?;
        let mut fields = BTreeMap::new();
        let mut text = None;

        for (idx, (header, value)) in headers.iter().zip(row.iter()).enumerate() {
            if idx == text_idx {
                text = Some(value.to_string()).filter(|v| !v.is_empty());
            } else {
                let name = column_name(header, |name| headers.iter().any(|h| h == name));
                fields.insert(name, Value::String(value.to_string()));
            }
        }

        records.push(Record {
            id,
            text,
            fields,
            embedding: Embedding::Pending,
        });
    }

    Ok(records)
}

/// Parse a JSON array of objects or JSONL (one object per line).
pub fn parse_json_records(input: &str, text_column: &str) -> Result<Vec<Record>, DatasetError> {
    let input = input.trim();

    if input.is_empty() {
        return Ok(Vec::new());
    }

    let rows: Vec<Value> = if input.starts_with('[') {
        serde_json::from_str(input)?
    } else {
        let mut rows = Vec::new();
        for (i, line) in input.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let row = serde_json::from_str(line)
                .map_err(|source| DatasetError::JsonLine { line: i + 1, source })?;
            rows.push(row);
        }
        rows
    };

    rows.into_iter()
        .enumerate()
        .map(|(id, row)| json_record(id, row, text_column))
        .collect()
}

fn json_record(id: usize, row: Value, text_column: &str) -> Result<Record, DatasetError> {
    let Value::Object(object) = row else {
        return Err(DatasetError::NotAnObject { row: id });
    };

    let keys: BTreeSet<String> = object.keys().cloned().collect();
    let mut text = None;
    let mut fields = BTreeMap::new();
    for (key, value) in object {
        if key == text_column {
            text = match value {
                Value::String(s) => Some(s),
                Value::Null => None,
                _ => {
                    return Err(DatasetError::InvalidText {
                        row: id,
                        column: key,
                    });
                }
            };
        } else {
            fields.insert(column_name(&key, |name| keys.contains(name)), value);
        }
    }

    Ok(Record {
        id,
        text,
        fields,
        embedding: Embedding::Pending,
    })
}

/// Reserved names get a `source_` prefix, repeated while another input column holds the name.
fn column_name(header: &str, in_use: impl Fn(&str) -> bool) -> String {
    if !RESERVED_COLUMNS.contains(&header) {
        return header.to_string();
    }
    let mut name = format!("source_{header}");
    while in_use(&name) {
        name = format!("source_{name}");
    }
    name
}

fn is_embedding_column(name: &str) -> bool {
    name.strip_prefix("emb_")
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// SHA-256 over the ordered texts, used to tie a checkpoint to its input.
pub fn input_fingerprint(records: &[Record]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        match &record.text {
            Some(text) => {
                hasher.update([1u8]);
                hasher.update((text.len() as u64).to_le_bytes());
                hasher.update(text.as_bytes());
            }
            None => hasher.update([0u8]),
        }
    }
    hex::encode(hasher.finalize())
}

/// Destination for the completed record collection.
pub trait OutputSink: Send + Sync {
    /// Write every record. Records still pending are rejected.
    fn write(&self, records: &[Record]) -> Result<(), DatasetError>;
}

/// Output artifact on local disk.
#[derive(Debug, Clone)]
pub struct OutputFile {
    path: PathBuf,
    format: DataFormat,
}

impl OutputFile {
    pub fn new(path: impl Into<PathBuf>, format: DataFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    /// Format taken from the extension, JSONL when it is not recognised.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let format = DataFormat::from_path(&path).unwrap_or(DataFormat::Jsonl);
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> DataFormat {
        self.format
    }
}

impl OutputSink for OutputFile {
    fn write(&self, records: &[Record]) -> Result<(), DatasetError> {
        if let Some(pending) = records.iter().find(|r| r.embedding.is_pending()) {
            return Err(DatasetError::Incomplete(pending.id));
        }

        let bytes = match self.format {
            DataFormat::Jsonl => {
                let mut out = Vec::new();
                for record in records {
                    serde_json::to_writer(&mut out, &output_row(record))?;
                    out.push(b'\n');
                }
                out
            }
            DataFormat::Json => {
                let rows: Vec<OutputRow<'_>> = records.iter().map(output_row).collect();
                serde_json::to_vec(&rows)?
            }
            DataFormat::Csv => csv_bytes(records)?,
        };

        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), format = %self.format, records = records.len(), "wrote output");
        Ok(())
    }
}

/// Flat JSON object: carried fields, then `id`, `text` and `embedding` (`null` when absent).
#[derive(Serialize)]
struct OutputRow<'a> {
    #[serde(flatten)]
    fields: &'a BTreeMap<String, Value>,
    id: usize,
    text: Option<&'a str>,
    embedding: Option<&'a [f32]>,
}

fn output_row(record: &Record) -> OutputRow<'_> {
    OutputRow {
        fields: &record.fields,
        id: record.id,
        text: record.text.as_deref(),
        embedding: record.embedding.as_vector(),
    }
}

/// Wide CSV: `id`, `text`, carried fields, then one `emb_N` column per dimension.
fn csv_bytes(records: &[Record]) -> Result<Vec<u8>, DatasetError> {
    let columns: BTreeSet<&str> = records
        .iter()
        .flat_map(|r| r.fields.keys().map(String::as_str))
        .collect();
    let dimension = records
        .iter()
        .filter_map(|r| r.embedding.as_vector().map(<[f32]>::len))
        .max()
        .unwrap_or(0);

    let mut writer = csv::Writer::from_writer(Vec::new());

    // carried columns must not shadow id, text or the emb_N block
    let mut header: Vec<String> = vec!["id".into(), "text".into()];
    header.extend(columns.iter().map(|column| {
        if *column != "id" && *column != "text" && !is_embedding_column(column) {
            return column.to_string();
        }
        let mut name = format!("source_{column}");
        while columns.contains(name.as_str()) {
            name = format!("source_{name}");
        }
        name
    }));
    header.extend((1..=dimension).map(|i| format!("emb_{i}")));
    writer.write_record(&header)?;

    for record in records {
        let mut row: Vec<String> = Vec::with_capacity(header.len());
        row.push(record.id.to_string());
        row.push(record.text.clone().unwrap_or_default());
        for column in &columns {
            row.push(match record.fields.get(*column) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            });
        }
        match record.embedding.as_vector() {
            Some(vector) => row.extend(vector.iter().map(f32::to_string)),
            None => row.extend(std::iter::repeat_n(String::new(), dimension)),
        }
        writer.write_record(&row)?;
    }

    writer
        .into_inner()
        .map_err(|e| DatasetError::IoError(e.into_error()))
}

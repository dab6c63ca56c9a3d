//! End-to-end runs against a mock embeddings API with on-disk checkpoint and output.

use std::fs;
use std::time::Duration;

use batch_embed::models::{EmbeddingConfig, Embedding};
use batch_embed::services::{
    Checkpoint, CheckpointStore, EmbeddingClient, FileCheckpointStore, OutputFile, Pipeline,
    PipelineOptions, input_fingerprint, load_records,
};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers every request with `[len(text), index]` per input.
struct EchoEmbeddings;

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let data: Vec<Value> = body["input"]
            .as_array()
            .unwrap()
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let len = text.as_str().unwrap().len();
                json!({"object": "embedding", "index": i, "embedding": [len as f32, i as f32]})
            })
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data}))
    }
}

fn client_for(server: &MockServer) -> EmbeddingClient {
    let config = EmbeddingConfig {
        base_url: format!("{}/v1", server.uri()),
        ..Default::default()
    };
    EmbeddingClient::new(&config, "sk-test").unwrap()
}

fn options(batch_size: usize, frequency: usize) -> PipelineOptions {
    PipelineOptions::new(batch_size, frequency, 3)
        .unwrap()
        .with_backoff_unit(Duration::from_millis(1))
        .with_inter_batch_delay(Duration::ZERO)
}

fn write_input(dir: &TempDir) -> std::path::PathBuf {
    let input = dir.path().join("posts.csv");
    fs::write(
        &input,
        "id,text,channel\n\
         p1,hello,news\n\
         p2,,news\n\
         p3,abc,sports\n\
         p4,   ,sports\n\
         p5,embed me,news\n",
    )
    .unwrap();
    input
}

#[tokio::test]
async fn test_csv_to_jsonl_run() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbeddings)
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let store = FileCheckpointStore::new(dir.path().join("run.checkpoint.json"));
    let sink = OutputFile::from_path(dir.path().join("out.jsonl"));

    let records = load_records(&input, "text").unwrap();
    let outcome = Pipeline::new(&client, &store, &sink, options(2, 2))
        .run(records)
        .await
        .unwrap();

    assert_eq!(outcome.summary.total, 5);
    assert_eq!(outcome.summary.embedded, 3);
    assert_eq!(outcome.summary.absent, 2);
    assert_eq!(outcome.summary.remote_calls, 3);
    assert!(!store.path().exists());

    let lines: Vec<Value> = fs::read_to_string(sink.path())
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0]["id"], 0);
    assert_eq!(lines[0]["source_id"], "p1");
    assert_eq!(lines[0]["channel"], "news");
    assert_eq!(lines[0]["embedding"], json!([5.0, 0.0]));
    assert_eq!(lines[1]["embedding"], Value::Null);
    assert_eq!(lines[2]["embedding"], json!([3.0, 0.0]));
    assert_eq!(lines[3]["embedding"], Value::Null);
    assert_eq!(lines[4]["text"], "embed me");
    assert_eq!(lines[4]["embedding"], json!([8.0, 0.0]));
}

#[tokio::test]
async fn test_resume_from_checkpoint_file() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir);
    let records = load_records(&input, "text").unwrap();

    // a previous run got through the first two records
    let mut partial = records.clone();
    partial[0].embedding = Embedding::Vector(vec![5.0, 0.0]);
    partial[1].embedding = Embedding::Absent;
    partial[2].embedding = Embedding::Vector(vec![3.0, 0.0]);
    let store = FileCheckpointStore::new(dir.path().join("run.checkpoint.json"));
    store
        .save(&Checkpoint::new(
            "text-embedding-3-small",
            input_fingerprint(&records),
            partial,
        ))
        .unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbeddings)
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let sink = OutputFile::from_path(dir.path().join("out.csv"));
    let outcome = Pipeline::new(&client, &store, &sink, options(10, 10))
        .run(records)
        .await
        .unwrap();

    assert_eq!(outcome.summary.resumed_from, 3);
    assert_eq!(outcome.summary.embedded, 3);
    assert!(!store.path().exists());

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["input"], json!(["embed me"]));

    let csv = fs::read_to_string(sink.path()).unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("id,text,channel,source_id,emb_1,emb_2"));
    assert_eq!(lines.next(), Some("0,hello,news,p1,5,0"));
    assert_eq!(lines.next(), Some("1,,news,p2,,"));
}

#[tokio::test]
async fn test_failing_service_degrades_without_aborting() {
    let dir = TempDir::new().unwrap();
    let input = write_input(&dir);
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .expect(6)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let store = FileCheckpointStore::new(dir.path().join("run.checkpoint.json"));
    let sink = OutputFile::from_path(dir.path().join("out.jsonl"));

    let records = load_records(&input, "text").unwrap();
    let outcome = Pipeline::new(&client, &store, &sink, options(3, 3))
        .run(records)
        .await
        .unwrap();

    // two batches with text, three attempts each
    assert_eq!(outcome.summary.degraded_batches, 2);
    assert_eq!(outcome.summary.absent, 5);
    assert!(outcome.records.iter().all(|r| r.embedding.is_absent()));
    assert!(sink.path().exists());
}

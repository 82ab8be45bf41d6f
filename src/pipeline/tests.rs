//! Tests for the pipeline module

use super::*;
use crate::sync::{SyncMode, WriteMode};
use crate::warehouse::DuckDbWarehouse;
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::sync::Mutex;

/// Labels text by keyword and records every call
#[derive(Default)]
struct KeywordAnalyzer {
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl KeywordAnalyzer {
    fn failing_on(text: &'static str) -> Self {
        Self {
            fail_on: Some(text),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SentimentAnalyzer for KeywordAnalyzer {
    async fn analyze(&self, text: &str) -> Result<String> {
        self.calls.lock().unwrap().push(text.to_string());
        if self.fail_on == Some(text) {
            return Err(Error::sentiment("model unavailable"));
        }
        let label = if text.contains("love") {
            "Positive"
        } else if text.contains("slow") {
            "Negative"
        } else {
            "Neutral"
        };
        Ok(label.to_string())
    }
}

async fn seeded_source() -> DuckDbWarehouse {
    let source = DuckDbWarehouse::in_memory("surveys").unwrap();
    source
        .execute(
            "CREATE TABLE surveys.satisfaction_surveys (id INTEGER, body_text VARCHAR);
             INSERT INTO surveys.satisfaction_surveys VALUES
                (1, 'I love the new app'),
                (2, 'Delivery was slow'),
                (3, NULL),
                (4, ''),
                (5, 'It arrived');",
        )
        .await
        .unwrap();
    source
}

async fn results(dest: &DuckDbWarehouse) -> Vec<(String, String, String)> {
    let result = dest
        .execute(
            "SELECT id, query_text, sentiment FROM results.staging_sentiment_analysis
             ORDER BY CAST(id AS INTEGER)",
        )
        .await
        .unwrap();
    result
        .rows
        .into_iter()
        .map(|row| {
            let text = |v: &JsonValue| v.as_str().unwrap_or_default().to_string();
            (text(&row[0]), text(&row[1]), text(&row[2]))
        })
        .collect()
}

#[test]
fn test_ingestion_query_without_exclusions() {
    let source = DuckDbWarehouse::in_memory("surveys").unwrap();
    let analyzer = KeywordAnalyzer::default();
    let pipeline = SentimentPipeline::new(&source, &source, &analyzer);

    assert_eq!(
        pipeline.ingestion_query(&[]).unwrap(),
        "SELECT \"id\", \"body_text\" FROM \"surveys\".\"satisfaction_surveys\" \
         WHERE \"body_text\" IS NOT NULL AND \"body_text\" != ''"
    );
}

#[test]
fn test_ingestion_query_excludes_processed_ids() {
    let source = DuckDbWarehouse::in_memory("surveys").unwrap();
    let analyzer = KeywordAnalyzer::default();
    let pipeline = SentimentPipeline::new(&source, &source, &analyzer);

    let sql = pipeline
        .ingestion_query(&["1".to_string(), "abc-2".to_string()])
        .unwrap();

    assert!(sql.ends_with(" AND CAST(\"id\" AS VARCHAR) NOT IN ('1', 'abc-2')"));
}

#[test]
fn test_ingestion_query_rejects_unsafe_id() {
    let source = DuckDbWarehouse::in_memory("surveys").unwrap();
    let analyzer = KeywordAnalyzer::default();
    let pipeline = SentimentPipeline::new(&source, &source, &analyzer);

    let err = pipeline
        .ingestion_query(&["1".to_string(), "1') OR ('1'='1".to_string()])
        .unwrap_err();

    assert!(matches!(err, Error::UnsafeIdentifier { .. }));
}

#[tokio::test]
async fn test_run_writes_results_for_eligible_rows() {
    let source = seeded_source().await;
    let dest = source.with_dataset("results").unwrap();
    let analyzer = KeywordAnalyzer::default();

    let stats = SentimentPipeline::new(&source, &dest, &analyzer)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.rows_read, 3);
    assert_eq!(stats.ids_skipped, 0);
    assert_eq!(stats.rows_written, 3);
    assert!(stats.write.as_ref().unwrap().created);
    assert_eq!(analyzer.calls().len(), 3);
    assert_eq!(
        results(&dest).await,
        vec![
            ("1".into(), "I love the new app".into(), "Positive".into()),
            ("2".into(), "Delivery was slow".into(), "Negative".into()),
            ("5".into(), "It arrived".into(), "Neutral".into()),
        ]
    );
}

#[tokio::test]
async fn test_incremental_run_skips_processed_ids() {
    let source = seeded_source().await;
    let dest = source.with_dataset("results").unwrap();

    let first = KeywordAnalyzer::default();
    SentimentPipeline::new(&source, &dest, &first)
        .run()
        .await
        .unwrap();

    source
        .execute("INSERT INTO surveys.satisfaction_surveys VALUES (6, 'love the staff')")
        .await
        .unwrap();

    let second = KeywordAnalyzer::default();
    let stats = SentimentPipeline::new(&source, &dest, &second)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.ids_skipped, 3);
    assert_eq!(stats.rows_written, 1);
    assert_eq!(second.calls(), vec!["love the staff".to_string()]);
    assert_eq!(results(&dest).await.len(), 4);
}

#[tokio::test]
async fn test_run_with_nothing_new_writes_nothing() {
    let source = seeded_source().await;
    let dest = source.with_dataset("results").unwrap();

    SentimentPipeline::new(&source, &dest, &KeywordAnalyzer::default())
        .run()
        .await
        .unwrap();

    let analyzer = KeywordAnalyzer::default();
    let stats = SentimentPipeline::new(&source, &dest, &analyzer)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.rows_read, 0);
    assert_eq!(stats.rows_written, 0);
    assert!(stats.write.is_none());
    assert!(analyzer.calls().is_empty());
}

#[tokio::test]
async fn test_full_refresh_truncate_rewrites_table() {
    let source = seeded_source().await;
    let dest = source.with_dataset("results").unwrap();

    SentimentPipeline::new(&source, &dest, &KeywordAnalyzer::default())
        .run()
        .await
        .unwrap();

    let options = PipelineOptions {
        incremental: false,
        mode: WriteMode::Truncate,
        ..PipelineOptions::default()
    };
    let stats = SentimentPipeline::new(&source, &dest, &KeywordAnalyzer::default())
        .with_options(options)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.write.unwrap().mode, SyncMode::Truncate);
    assert_eq!(results(&dest).await.len(), 3);
}

#[tokio::test]
async fn test_truncate_analyzes_every_row_even_when_incremental() {
    let source = seeded_source().await;
    let dest = source.with_dataset("results").unwrap();

    SentimentPipeline::new(&source, &dest, &KeywordAnalyzer::default())
        .run()
        .await
        .unwrap();

    source
        .execute("INSERT INTO surveys.satisfaction_surveys VALUES (6, 'new one')")
        .await
        .unwrap();

    let options = PipelineOptions {
        mode: WriteMode::Truncate,
        ..PipelineOptions::default()
    };
    assert!(options.incremental);

    let analyzer = KeywordAnalyzer::default();
    let stats = SentimentPipeline::new(&source, &dest, &analyzer)
        .with_options(options)
        .run()
        .await
        .unwrap();

    assert_eq!(stats.ids_skipped, 0);
    assert_eq!(stats.rows_written, 4);
    assert_eq!(analyzer.calls().len(), 4);

    let ids: Vec<String> = results(&dest).await.into_iter().map(|(id, _, _)| id).collect();
    assert_eq!(ids, vec!["1", "2", "5", "6"]);
}

#[tokio::test]
async fn test_analyzer_failure_aborts_before_write() {
    let source = seeded_source().await;
    let dest = source.with_dataset("results").unwrap();
    let analyzer = KeywordAnalyzer::failing_on("Delivery was slow");

    let err = SentimentPipeline::new(&source, &dest, &analyzer)
        .run()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Sentiment { .. }));
    assert!(dest
        .get_schema("staging_sentiment_analysis")
        .await
        .unwrap()
        .is_absent());
}

#[test]
fn test_options_from_config() {
    let config = crate::config::PipelineConfig::from_yaml(
        r#"
project: my-project
source_dataset: raw
output_dataset: derived
mode: replace
stored_procedure: merge_sentiment
incremental: false
"#,
    )
    .unwrap();

    let options = PipelineOptions::from_config(&config).unwrap();

    assert_eq!(
        options.mode,
        WriteMode::Replace {
            procedure: "merge_sentiment".to_string()
        }
    );
    assert!(!options.incremental);
    assert_eq!(options.source_table, config.source_table);
}

//! Table sync tests

use super::*;
use crate::dataset::Cell;
use crate::schema::SchemaField;
use crate::types::JsonValue;
use crate::warehouse::{Dialect, DuckDbWarehouse, QueryResult};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rand::SeedableRng;
use serde_json::json;
use std::error::Error as _;
use std::sync::Mutex;

// ============================================================================
// Recording warehouse
// ============================================================================

/// Warehouse double that records every call and fails on demand
#[derive(Default)]
struct RecordingWarehouse {
    schema: TableSchema,
    schema_fails: bool,
    /// Fail any call whose record starts with one of these prefixes
    fail_on: Vec<&'static str>,
    calls: Mutex<Vec<String>>,
}

impl RecordingWarehouse {
    fn with_table(columns: &[&str]) -> Self {
        Self {
            schema: TableSchema::new(
                columns
                    .iter()
                    .map(|c| SchemaField::new(*c, "STRING"))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    fn failing_on(mut self, prefix: &'static str) -> Self {
        self.fail_on.push(prefix);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) -> Result<()> {
        let fail = self.fail_on.iter().any(|p| call.starts_with(p));
        self.calls.lock().unwrap().push(call.clone());
        if fail {
            Err(Error::warehouse(format!("injected failure: {call}")))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    fn dialect(&self) -> Dialect {
        Dialect::BigQuery
    }

    fn dataset(&self) -> &str {
        "analytics"
    }

    fn qualified_table(&self, table: &str) -> String {
        format!("`proj.analytics.{table}`")
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        self.record(format!("SCHEMA {table}"))?;
        if self.schema_fails {
            return Err(Error::schema_fetch(table, "permission denied"));
        }
        Ok(self.schema.clone())
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        self.record(sql.to_string())?;
        Ok(QueryResult::default())
    }

    async fn load(
        &self,
        table: &str,
        data: &SanitizedDataset,
        disposition: LoadDisposition,
    ) -> Result<u64> {
        self.record(format!("LOAD {table} {disposition:?}"))?;
        Ok(data.len() as u64)
    }

    async fn call_procedure(&self, name: &str, args: &[String]) -> Result<()> {
        self.record(format!("CALL {name}({})", args.join(", ")))
    }
}

fn one_row() -> Dataset {
    Dataset::from_rows(["id", "query_text"], vec![vec![Cell::Integer(1), Cell::from("ok")]])
        .unwrap()
}

fn staging_in(call: &str) -> String {
    let start = call.find(STAGING_PREFIX).unwrap();
    call[start..]
        .split(|c: char| c == '`' || c == ' ' || c == ',')
        .next()
        .unwrap()
        .to_string()
}

// ============================================================================
// Mode validation
// ============================================================================

#[tokio::test]
async fn test_unknown_mode_fails_before_remote_calls() {
    let wh = RecordingWarehouse::with_table(&["id"]);
    let sync = TableSync::new(&wh);

    let err = sync
        .insert_alter("scores", &one_row(), "bogus", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config { .. }));
    assert!(wh.calls().is_empty());
}

#[tokio::test]
async fn test_replace_without_procedure_fails_before_remote_calls() {
    let wh = RecordingWarehouse::with_table(&["id"]);
    let sync = TableSync::new(&wh);

    let err = sync
        .insert_alter("scores", &one_row(), "replace", None)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config { .. }));
    assert!(wh.calls().is_empty());
}

#[tokio::test]
async fn test_duplicate_normalized_columns_rejected() {
    let wh = RecordingWarehouse::default();
    let dataset =
        Dataset::from_rows(["a b", "a-b"], vec![vec![Cell::from("1"), Cell::from("2")]]).unwrap();

    let err = TableSync::new(&wh)
        .insert_alter("scores", &dataset, "append", None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("a_b"));
    assert!(wh.calls().is_empty());
}

#[tokio::test]
async fn test_empty_dataset_makes_no_remote_calls() {
    for mode in ["append", "truncate", "replace", "bogus"] {
        let wh = RecordingWarehouse::with_table(&["id"]);
        let summary = TableSync::new(&wh)
            .insert_alter("scores", &Dataset::new(["id", "query_text"]), mode, None)
            .await
            .unwrap();

        assert_eq!(summary.rows_written, 0);
        assert!(wh.calls().is_empty(), "mode {mode} made remote calls");
    }
}

#[tokio::test]
async fn test_empty_dataset_skips_column_checks() {
    let wh = RecordingWarehouse::default();
    let summary = TableSync::new(&wh)
        .insert_alter("scores", &Dataset::new(["a b", "a-b"]), "append", None)
        .await
        .unwrap();

    assert_eq!(summary.rows_written, 0);
    assert!(wh.calls().is_empty());
}

// ============================================================================
// Call sequences
// ============================================================================

#[tokio::test]
async fn test_append_adds_missing_columns_first() {
    let wh = RecordingWarehouse::with_table(&["id"]);
    let summary = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "append", None)
        .await
        .unwrap();

    assert_eq!(
        wh.calls(),
        vec![
            "SCHEMA scores".to_string(),
            "ALTER TABLE `proj.analytics.scores` ADD COLUMN IF NOT EXISTS `query_text` STRING"
                .to_string(),
            "LOAD scores Append".to_string(),
        ]
    );
    assert_eq!(summary.columns_added, vec!["query_text"]);
    assert_eq!(summary.rows_written, 1);
    assert!(!summary.created);
}

#[tokio::test]
async fn test_truncate_deletes_then_appends_without_alter() {
    let wh = RecordingWarehouse::with_table(&["id"]);
    TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "truncate", None)
        .await
        .unwrap();

    assert_eq!(
        wh.calls(),
        vec![
            "SCHEMA scores".to_string(),
            "DELETE FROM `proj.analytics.scores` WHERE 1=1".to_string(),
            "LOAD scores Append".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_absent_table_is_created_by_append_load_in_every_mode() {
    for (mode, procedure) in [("append", None), ("truncate", None), ("replace", Some("merge"))] {
        let wh = RecordingWarehouse::default();
        let summary = TableSync::new(&wh)
            .insert_alter("scores", &one_row(), mode, procedure)
            .await
            .unwrap();

        assert_eq!(
            wh.calls(),
            vec!["SCHEMA scores".to_string(), "LOAD scores Append".to_string()]
        );
        assert!(summary.created);
    }
}

#[tokio::test]
async fn test_replace_sequence() {
    let wh = RecordingWarehouse::with_table(&["id", "query_text"]);
    TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("merge_scores"))
        .await
        .unwrap();

    let calls = wh.calls();
    assert_eq!(calls.len(), 5);
    let staging = staging_in(&calls[1]);
    assert!(StagingTable::is_staging_name(&staging));

    assert_eq!(
        calls,
        vec![
            "SCHEMA scores".to_string(),
            format!(
                "CREATE TABLE `proj.analytics.{staging}` AS \
                 SELECT * FROM `proj.analytics.scores` LIMIT 0"
            ),
            format!("LOAD {staging} Replace"),
            format!("CALL merge_scores(scores, {staging}, analytics)"),
            format!("DROP TABLE IF EXISTS `proj.analytics.{staging}`"),
        ]
    );
}

#[tokio::test]
async fn test_replace_procedure_failure_drops_staging_and_wraps_error() {
    let wh = RecordingWarehouse::with_table(&["id", "query_text"]).failing_on("CALL");
    let err = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("merge_scores"))
        .await
        .unwrap_err();

    let calls = wh.calls();
    assert!(calls.last().unwrap().starts_with("DROP TABLE IF EXISTS"));

    match err {
        Error::Merge {
            table,
            staging,
            phase,
            staging_dropped,
            source,
        } => {
            assert_eq!(table, "scores");
            assert_eq!(staging, staging_in(calls.last().unwrap()));
            assert_eq!(phase, StagingPhase::StagingLoaded);
            assert!(staging_dropped);
            assert!(source.to_string().contains("injected failure: CALL merge_scores"));
        }
        other => panic!("expected merge error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_replace_load_failure_drops_staging() {
    let wh = RecordingWarehouse::with_table(&["id", "query_text"]).failing_on("LOAD");
    let err = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("merge_scores"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Merge {
            phase: StagingPhase::StagingCreated,
            ..
        }
    ));
    assert!(wh.calls().last().unwrap().starts_with("DROP TABLE IF EXISTS"));
    assert!(!wh.calls().iter().any(|c| c.starts_with("CALL")));
}

#[tokio::test]
async fn test_replace_merge_and_drop_failure_reports_leftover_staging() {
    let wh = RecordingWarehouse::with_table(&["id", "query_text"])
        .failing_on("CALL")
        .failing_on("DROP");
    let err = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("merge_scores"))
        .await
        .unwrap_err();

    let staging = staging_in(wh.calls().last().unwrap());
    assert!(matches!(
        err,
        Error::Merge {
            staging_dropped: false,
            ..
        }
    ));
    let message = err.to_string();
    assert!(message.contains(&staging));
    assert!(message.contains("was not dropped"));
    assert!(err.source().unwrap().to_string().contains("CALL merge_scores"));
}

#[tokio::test]
async fn test_replace_drop_failure_after_success_is_returned() {
    let wh = RecordingWarehouse::with_table(&["id", "query_text"]).failing_on("DROP");
    let err = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("merge_scores"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Warehouse { .. }));
    assert!(err.to_string().contains("DROP TABLE"));
}

#[tokio::test]
async fn test_schema_fetch_policy() {
    let strict = RecordingWarehouse {
        schema_fails: true,
        ..RecordingWarehouse::default()
    };
    let err = TableSync::new(&strict)
        .insert_alter("scores", &one_row(), "append", None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::SchemaFetch { .. }));
    assert_eq!(strict.calls(), vec!["SCHEMA scores".to_string()]);

    let lenient = RecordingWarehouse {
        schema_fails: true,
        ..RecordingWarehouse::default()
    };
    let summary = TableSync::new(&lenient)
        .with_schema_policy(SchemaFetchPolicy::TreatAsAbsent)
        .insert_alter("scores", &one_row(), "append", None)
        .await
        .unwrap();
    assert!(summary.created);
}

// ============================================================================
// DuckDB end-to-end
// ============================================================================

async fn duck_with_scores() -> DuckDbWarehouse {
    let wh = DuckDbWarehouse::in_memory("analytics").unwrap();
    wh.execute("CREATE TABLE analytics.scores (id VARCHAR)")
        .await
        .unwrap();
    wh.execute("INSERT INTO analytics.scores VALUES ('2')")
        .await
        .unwrap();
    wh
}

async fn staging_tables(wh: &DuckDbWarehouse) -> Vec<JsonValue> {
    wh.execute(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = 'analytics' AND starts_with(table_name, '_STG_')",
    )
    .await
    .unwrap()
    .rows
    .into_iter()
    .flatten()
    .collect()
}

#[tokio::test]
async fn test_duckdb_append_adds_text_column() {
    let wh = duck_with_scores().await;
    TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "append", None)
        .await
        .unwrap();

    let schema = wh.get_schema("scores").await.unwrap();
    assert_eq!(
        schema.fields,
        vec![
            SchemaField::new("id", "VARCHAR"),
            SchemaField::new("query_text", "VARCHAR"),
        ]
    );

    let rows = wh
        .execute("SELECT id, query_text FROM analytics.scores ORDER BY id")
        .await
        .unwrap()
        .rows;
    assert_eq!(
        rows,
        vec![vec![json!("1"), json!("ok")], vec![json!("2"), JsonValue::Null]]
    );
}

#[tokio::test]
async fn test_duckdb_truncate_keeps_schema() {
    let wh = DuckDbWarehouse::in_memory("analytics").unwrap();
    wh.execute("CREATE TABLE analytics.scores (id VARCHAR, query_text VARCHAR, extra VARCHAR)")
        .await
        .unwrap();
    wh.execute("INSERT INTO analytics.scores VALUES ('9', 'old', 'x'), ('8', 'older', 'y')")
        .await
        .unwrap();
    let before = wh.get_schema("scores").await.unwrap();

    TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "truncate", None)
        .await
        .unwrap();

    assert_eq!(wh.get_schema("scores").await.unwrap(), before);
    let rows = wh
        .execute("SELECT id, query_text, extra FROM analytics.scores")
        .await
        .unwrap()
        .rows;
    assert_eq!(rows, vec![vec![json!("1"), json!("ok"), JsonValue::Null]]);
}

#[tokio::test]
async fn test_duckdb_replace_merges_and_drops_staging() {
    let mut wh = duck_with_scores().await;
    wh.register_procedure(
        "merge_scores",
        "INSERT INTO {{ vars.dataset }}.{{ vars.target }} (id, query_text) \
         SELECT id, query_text FROM {{ vars.dataset }}.{{ vars.staging }};",
    );

    let summary = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("merge_scores"))
        .await
        .unwrap();

    assert_eq!(summary.rows_written, 1);
    assert_eq!(summary.columns_added, vec!["query_text"]);
    assert!(staging_tables(&wh).await.is_empty());

    let count = wh
        .execute("SELECT COUNT(*) AS n FROM analytics.scores")
        .await
        .unwrap();
    assert_eq!(count.rows, vec![vec![json!(2)]]);
}

#[tokio::test]
async fn test_duckdb_replace_failure_leaves_no_staging_table() {
    let wh = duck_with_scores().await;

    let err = TableSync::new(&wh)
        .insert_alter("scores", &one_row(), "replace", Some("missing_proc"))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Merge { .. }));
    assert!(staging_tables(&wh).await.is_empty());
}

#[tokio::test]
async fn test_duckdb_creates_absent_table() {
    let wh = DuckDbWarehouse::in_memory("analytics").unwrap();
    let summary = TableSync::new(&wh)
        .insert_alter("fresh", &one_row(), "truncate", None)
        .await
        .unwrap();

    assert!(summary.created);
    assert_eq!(
        wh.get_schema("fresh").await.unwrap().column_names(),
        ["id", "query_text"]
            .iter()
            .map(|s| (*s).to_string())
            .collect::<BTreeSet<String>>()
    );
}

// ============================================================================
// Types
// ============================================================================

#[test]
fn test_write_mode_parse() {
    assert_eq!(WriteMode::parse("append", None).unwrap(), WriteMode::Append);
    assert_eq!(WriteMode::parse("truncate", Some("ignored")).unwrap(), WriteMode::Truncate);
    assert_eq!(
        WriteMode::parse("replace", Some("merge")).unwrap(),
        WriteMode::Replace {
            procedure: "merge".to_string()
        }
    );
    assert!(WriteMode::parse("replace", Some("  ")).unwrap_err().is_config());
    assert!(WriteMode::parse("APPEND", None).unwrap_err().is_config());
}

#[test]
fn test_sync_mode_round_trips_through_str() {
    for mode in [SyncMode::Append, SyncMode::Truncate, SyncMode::Replace] {
        assert_eq!(mode.to_string().parse::<SyncMode>().unwrap(), mode);
    }
}

#[test]
fn test_staging_table_name() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let staging = StagingTable::generate_with(&mut rng, "scores");
    let name = staging.name();

    assert!(name.starts_with("_STG_"));
    assert!(name.ends_with("_scores"));
    assert_eq!(name.len(), "_STG_".len() + STAGING_TOKEN_LEN + "_scores".len());
    assert!(name[5..13].bytes().all(|b| b.is_ascii_uppercase()));
    assert!(StagingTable::is_staging_name(name));
}

#[test]
fn test_staging_names_differ() {
    let a = StagingTable::generate("scores");
    let b = StagingTable::generate("scores");
    assert_ne!(a, b);
}

#[test]
fn test_is_staging_name() {
    assert!(StagingTable::is_staging_name("_STG_ABCDEFGH_t"));
    assert!(!StagingTable::is_staging_name("_STG_abcdefgh_t"));
    assert!(!StagingTable::is_staging_name("_STG_ABC_t"));
    assert!(!StagingTable::is_staging_name("scores"));
}

#[test]
fn test_staging_phase_display() {
    assert_eq!(StagingPhase::Start.to_string(), "START");
    assert_eq!(StagingPhase::StagingDropped.to_string(), "STAGING_DROPPED");
}

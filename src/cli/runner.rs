//! CLI runner - builds the config and the clients, then runs the pipeline

use crate::auth::ServiceAccountKey;
use crate::cli::commands::{Backend, Cli};
use crate::config::{PipelineConfig, WarehouseConfig, ENV_CREDENTIALS};
use crate::error::{Error, Result};
use crate::pipeline::{PipelineOptions, PipelineStats, SentimentPipeline};
use crate::sentiment::CompletionSentiment;
use crate::warehouse::{BigQueryConfig, BigQueryWarehouse, DuckDbWarehouse, Warehouse};
use serde_json::json;
use std::time::Instant;
use tracing::info;

/// CLI runner
pub struct Runner {
    cli: Cli,
}

impl Runner {
    /// Create a new runner
    pub fn new(cli: Cli) -> Self {
        Self { cli }
    }

    /// Run the pipeline and print its stats as one JSON line
    pub async fn run(&self) -> Result<()> {
        let start = Instant::now();
        let config = self.load_config()?;

        info!(
            project = %config.project,
            source = %config.source_dataset,
            output = %config.output_dataset,
            mode = %config.mode,
            "starting sentiment sync"
        );

        let (source, destination) = build_warehouses(&config)?;
        let analyzer = CompletionSentiment::from_config(&config.sentiment)?;
        let options = PipelineOptions::from_config(&config)?;

        let stats = SentimentPipeline::new(source.as_ref(), destination.as_ref(), &analyzer)
            .with_options(options)
            .run()
            .await?;

        println!("{}", stats_json(&config, &stats));
        info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "sentiment sync complete"
        );
        Ok(())
    }

    /// Config file, then flags, then environment, then validation
    pub fn load_config(&self) -> Result<PipelineConfig> {
        self.load_config_with(|key| std::env::var(key).ok())
    }

    /// [`Runner::load_config`] with a caller-supplied variable lookup
    pub fn load_config_with<F>(&self, lookup: F) -> Result<PipelineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match &self.cli.config {
            Some(path) => PipelineConfig::from_file(path)?,
            None => PipelineConfig::default(),
        };

        self.apply_overrides(&mut config);
        config.apply_env_with(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut PipelineConfig) {
        let cli = &self.cli;

        config.project.clone_from(&cli.project);
        config.source_dataset.clone_from(&cli.input_dataset);
        config.output_dataset.clone_from(&cli.output_dataset);

        if let Some(mode) = cli.mode {
            config.mode = mode.into();
        }
        if let Some(procedure) = &cli.stored_procedure {
            config.stored_procedure = Some(procedure.clone());
        }
        if let Some(table) = &cli.source_table {
            config.source_table.clone_from(table);
        }
        if let Some(table) = &cli.destination_table {
            config.destination_table.clone_from(table);
        }
        if cli.full_refresh {
            config.incremental = false;
        }

        match cli.backend {
            Some(Backend::Bigquery)
                if matches!(config.warehouse, WarehouseConfig::DuckDb { .. }) =>
            {
                config.warehouse = WarehouseConfig::default();
            }
            Some(Backend::Duckdb)
                if matches!(config.warehouse, WarehouseConfig::BigQuery { .. }) =>
            {
                config.warehouse = WarehouseConfig::DuckDb { path: None };
            }
            _ => {}
        }
        if let (Some(new_path), WarehouseConfig::DuckDb { path }) =
            (&cli.duckdb_path, &mut config.warehouse)
        {
            *path = Some(new_path.clone());
        }
    }
}

/// Source and destination warehouses for a validated config
pub(crate) fn build_warehouses(
    config: &PipelineConfig,
) -> Result<(Box<dyn Warehouse>, Box<dyn Warehouse>)> {
    match &config.warehouse {
        WarehouseConfig::BigQuery {
            credentials_path,
            api_base,
            upload_base,
            location,
        } => {
            let path = credentials_path.as_ref().ok_or_else(|| {
                Error::config(format!(
                    "BigQuery credentials not configured \
                     (set warehouse.credentials_path or {ENV_CREDENTIALS})"
                ))
            })?;
            let auth = ServiceAccountKey::from_file(path)?.into_auth();

            let mut bq = BigQueryConfig::new(&config.project, &config.source_dataset);
            if let Some(base) = api_base {
                bq.api_base.clone_from(base);
            }
            if let Some(base) = upload_base {
                bq.upload_base.clone_from(base);
            }
            bq.location.clone_from(location);

            let source = BigQueryWarehouse::new(bq, auth)?;
            info!(project = source.project(), "using bigquery warehouse");
            let destination = source.with_dataset(&config.output_dataset);
            Ok((Box::new(source), Box::new(destination)))
        }
        WarehouseConfig::DuckDb { path } => {
            let source = match path {
                Some(path) => DuckDbWarehouse::open(path, &config.source_dataset)?,
                None => DuckDbWarehouse::in_memory(&config.source_dataset)?,
            };
            let destination = source.with_dataset(&config.output_dataset)?;
            info!(location = source.location(), "using duckdb warehouse");
            Ok((Box::new(source), Box::new(destination)))
        }
    }
}

fn stats_json(config: &PipelineConfig, stats: &PipelineStats) -> serde_json::Value {
    json!({
        "type": "STATS",
        "destination": format!("{}.{}", config.output_dataset, config.destination_table),
        "mode": config.mode.as_str(),
        "rows_read": stats.rows_read,
        "ids_skipped": stats.ids_skipped,
        "rows_written": stats.rows_written,
        "columns_added": stats.write.as_ref().map(|w| w.columns_added.clone()).unwrap_or_default(),
        "table_created": stats.write.as_ref().is_some_and(|w| w.created),
        "duration_ms": stats.duration_ms,
    })
}

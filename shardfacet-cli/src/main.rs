use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use shardfacet_core::api::types::PoolConfig;
use shardfacet_core::host::{FieldMappings, MemoryShard};
use shardfacet_core::{FacetPipeline, FacetPlan, FacetPools, FacetRequests, FacetResults};

#[derive(Parser)]
#[command(
  name = "shardfacet",
  version,
  about = "Run distinct-histogram and latest facets over JSON shards"
)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Scan every shard concurrently and print the reduced facets
  Run {
    /// JSON array of shards (`-` reads stdin)
    shards: PathBuf,
    /// JSON map of facet name to facet request
    facets: PathBuf,
    /// JSON map of logical field name to `{path, kind}`
    #[arg(long)]
    mappings: Option<PathBuf>,
    #[arg(long, default_value_t = 64)]
    max_pooled_maps: usize,
    #[arg(long, default_value_t = 65_536)]
    max_map_capacity: usize,
  },
  /// Check facet requests without running them
  Validate { facets: PathBuf },
}

fn main() -> Result<()> {
  init_tracing();
  let cli = Cli::parse();
  match cli.command {
    Commands::Run {
      shards,
      facets,
      mappings,
      max_pooled_maps,
      max_map_capacity,
    } => {
      let pools = FacetPools::new(PoolConfig {
        max_pooled_maps,
        max_map_capacity,
      });
      let output = cmd_run(&shards, &facets, mappings.as_deref(), pools)?;
      println!("{}", serde_json::to_string_pretty(&output)?);
      Ok(())
    }
    Commands::Validate { facets } => {
      let output = cmd_validate(&facets)?;
      println!("{}", serde_json::to_string_pretty(&output)?);
      Ok(())
    }
  }
}

fn init_tracing() {
  let filter = tracing_subscriber::EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
  let _ = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .try_init();
}

fn cmd_run(
  shards_path: &Path,
  facets_path: &Path,
  mappings_path: Option<&Path>,
  pools: FacetPools,
) -> Result<Value> {
  let shards: Vec<MemoryShard> = read_json(shards_path, "shards")?;
  let requests: FacetRequests = read_json(facets_path, "facet requests")?;
  let mappings: FieldMappings = match mappings_path {
    Some(path) => read_json(path, "field mappings")?,
    None => FieldMappings::new(),
  };
  let pipeline = FacetPipeline::from_requests(&requests, Arc::new(pools))?;
  tracing::info!(shards = shards.len(), facets = requests.len(), "running facets");
  Ok(render(pipeline.execute(&shards, &mappings)))
}

fn cmd_validate(facets_path: &Path) -> Result<Value> {
  let requests: FacetRequests = read_json(facets_path, "facet requests")?;
  let plan = FacetPlan::new(&requests).context("planning facet requests")?;
  let facets: Map<String, Value> = plan
    .names()
    .filter_map(|name| {
      plan
        .kind(name)
        .map(|kind| (name.to_string(), json!(kind.type_name())))
    })
    .collect();
  Ok(Value::Object(facets))
}

/// Failed facets are rendered as `{"error": "..."}` next to the successful ones.
fn render(results: FacetResults) -> Value {
  let facets = results
    .into_iter()
    .map(|(name, result)| {
      let value = match result {
        Ok(response) => serde_json::to_value(response)
          .unwrap_or_else(|err| json!({ "error": err.to_string() })),
        Err(err) => json!({ "error": err.to_string() }),
      };
      (name, value)
    })
    .collect();
  Value::Object(facets)
}

fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
  let contents = if path == Path::new("-") {
    let mut buf = String::new();
    io::stdin()
      .read_to_string(&mut buf)
      .with_context(|| format!("reading {what} from stdin"))?;
    buf
  } else {
    fs::read_to_string(path).with_context(|| format!("reading {what} from {:?}", path))?
  };
  serde_json::from_str(&contents).with_context(|| format!("parsing {what} JSON from {:?}", path))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  fn write(dir: &Path, name: &str, value: Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string(&value).unwrap()).unwrap();
    path
  }

  #[test]
  fn runs_facets_over_json_shards() {
    let dir = tempdir().unwrap();
    let shards = write(
      dir.path(),
      "shards.json",
      json!([
        {"docs": [
          {"fields": {"ts": 1000, "user": "a", "score": 3}},
          {"fields": {"ts": 2000, "user": ["a", "b"], "score": 4}}
        ]},
        {"docs": [
          {"fields": {"ts": 61000, "user": "c", "score": 5}},
          {"fields": {"ts": 500, "user": "a", "score": 9}}
        ]}
      ]),
    );
    let facets = write(
      dir.path(),
      "facets.json",
      json!({
        "visitors": {"distinct_date_histogram": {"key_field": "ts", "value_field": "user", "interval": "1m"}},
        "scores": {"latest": {"key_field": "user", "value_field": "score", "ts_field": "ts", "fields": ["key", "value"]}}
      }),
    );

    let output = cmd_run(&shards, &facets, None, FacetPools::default()).unwrap();
    assert_eq!(
      output["visitors"],
      json!({
        "_type": "distinct_date_histogram",
        "entries": [{"time": 0, "count": 2}, {"time": 60000, "count": 1}],
        "total_count": 3
      })
    );
    assert_eq!(
      output["scores"],
      json!({
        "_type": "latest",
        "total": 3,
        "entries": [
          {"key": "c", "value": 5},
          {"key": "a", "value": 4},
          {"key": "b", "value": 4}
        ]
      })
    );
  }

  #[test]
  fn mappings_file_redirects_fields() {
    let dir = tempdir().unwrap();
    let shards = write(
      dir.path(),
      "shards.json",
      json!([{"docs": [
        {"kind": "event", "fields": {"event.ts": 10, "event.user": "a"}},
        {"kind": "other", "fields": {"event.ts": 20, "event.user": "b"}}
      ]}]),
    );
    let facets = write(
      dir.path(),
      "facets.json",
      json!({"h": {"distinct_date_histogram": {"key_field": "ts", "value_field": "user", "interval": "1h"}}}),
    );
    let mappings = write(
      dir.path(),
      "mappings.json",
      json!({
        "ts": {"path": "event.ts"},
        "user": {"path": "event.user", "kind": "event"}
      }),
    );

    let output = cmd_run(&shards, &facets, Some(&mappings), FacetPools::default()).unwrap();
    assert_eq!(output["h"]["total_count"], json!(1));
  }

  #[test]
  fn validate_lists_facet_kinds_and_rejects_bad_requests() {
    let dir = tempdir().unwrap();
    let good = write(
      dir.path(),
      "good.json",
      json!({
        "h": {"distinct_date_histogram": {"key_field": "ts", "value_field": "u", "interval": "day"}},
        "l": {"latest": {"key_field": "k", "value_field": "v", "ts_field": "t"}}
      }),
    );
    assert_eq!(
      cmd_validate(&good).unwrap(),
      json!({"h": "distinct_date_histogram", "l": "latest"})
    );

    let bad = write(
      dir.path(),
      "bad.json",
      json!({"h": {"distinct_date_histogram": {"key_field": "ts", "value_field": "u", "interval": "0s"}}}),
    );
    let err = cmd_validate(&bad).unwrap_err();
    assert!(
      format!("{err:#}").contains("invalid facet configuration"),
      "unexpected error: {err:#}"
    );
  }

  #[test]
  fn missing_shards_file_reports_path() {
    let dir = tempdir().unwrap();
    let facets = write(dir.path(), "facets.json", json!({}));
    let err = cmd_run(
      &dir.path().join("nope.json"),
      &facets,
      None,
      FacetPools::default(),
    )
    .unwrap_err();
    assert!(err.to_string().contains("reading shards"), "unexpected error: {err}");
  }
}

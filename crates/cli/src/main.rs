//! `lifecycle` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate` — validate a graph JSON file and print its execution order.
//! - `run`      — run a graph JSON file against the in-memory backend.
//! - `demo`     — run the built-in classification-service lifecycles.

mod demo;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use engine::{Executor, ExecutorConfig, Graph};
use resources::{InMemoryClient, RetryPolicy, RetryingClient};

#[derive(Parser)]
#[command(
    name = "lifecycle",
    about = "Dependency-ordered resource lifecycle runner",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a graph definition JSON file.
    Validate {
        /// Path to the graph JSON file (an array of steps).
        path: PathBuf,
    },
    /// Run a graph definition JSON file against the in-memory backend.
    Run {
        /// Path to the graph JSON file (an array of steps).
        path: PathBuf,
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Run the inspect-template, info-type and job-trigger lifecycles.
    Demo {
        #[arg(long, env = "GCP_PROJECT_ID", default_value = "example-project")]
        project_id: String,
        #[command(flatten)]
        opts: RunOpts,
    },
}

#[derive(Args)]
struct RunOpts {
    /// Give up on the whole run after this many seconds.
    #[arg(long, env = "LIFECYCLE_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,
    /// Retries per client call on transient errors.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    /// Base delay for exponential back-off between retries.
    #[arg(long, default_value_t = 100)]
    retry_base_delay_ms: u64,
}

impl RunOpts {
    fn executor(&self) -> Executor {
        let policy = RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
        };
        let client = RetryingClient::new(InMemoryClient::new(), policy);
        let config = ExecutorConfig {
            run_timeout: self.timeout_secs.map(Duration::from_secs),
        };
        Executor::new(Arc::new(client), config)
    }
}

fn load_graph(path: &Path) -> anyhow::Result<Graph> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid graph JSON in {}", path.display()))
}

/// Run the graph, print the report to stdout, and exit non-zero on failure.
async fn execute(graph: &Graph, opts: &RunOpts) -> anyhow::Result<()> {
    let report = opts.executor().run(graph).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.all_succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let graph = load_graph(&path)?;
            match graph.validate().and_then(|_| graph.topological_order()) {
                Ok(order) => {
                    println!("✅ Graph is valid. Execution order: {order:?}");
                }
                Err(e) => {
                    eprintln!("❌ Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run { path, opts } => {
            let graph = load_graph(&path)?;
            info!("Running {} steps from {}", graph.len(), path.display());
            execute(&graph, &opts).await?;
        }
        Command::Demo { project_id, opts } => {
            let graph = demo::example_graph(&project_id)?;
            info!("Running example lifecycles for project {project_id}");
            execute(&graph, &opts).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{EngineError, StepStatus};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn graph_file(json: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    fn opts() -> RunOpts {
        RunOpts { timeout_secs: None, max_retries: 0, retry_base_delay_ms: 0 }
    }

    #[test]
    fn example_graph_is_valid() {
        let graph = demo::example_graph("example-project").unwrap();
        graph.validate().unwrap();
        assert_eq!(graph.len(), 9);
    }

    #[tokio::test]
    async fn example_graph_runs_to_completion() {
        let graph = demo::example_graph("example-project").unwrap();
        let report = opts().executor().run(&graph).await.unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.count(StepStatus::Succeeded), 9);

        let inspect = report.get("inspect_content").unwrap().output.clone().unwrap();
        assert_eq!(inspect["inspect_template_name"], "inspect_template/dlp-inspect-838746");

        let updated = report.get("update_trigger").unwrap().output.clone().unwrap();
        assert_eq!(
            updated["job_trigger"]["triggers"][0]["schedule"]["recurrence_period_duration"]["seconds"],
            172_800
        );
    }

    #[test]
    fn load_graph_accepts_forward_references() {
        let file = graph_file(
            r#"[
                { "name": "drop", "operation": "delete", "resource_kind": "tpl",
                  "params": { "id": { "ref": { "source_step": "make", "field_path": "id" } } },
                  "depends_on": ["make"] },
                { "name": "make", "operation": "create", "resource_kind": "tpl",
                  "params": { "id": { "literal": "t1" } } }
            ]"#,
        );

        let graph = load_graph(file.path()).unwrap();

        graph.validate().unwrap();
        assert_eq!(graph.topological_order().unwrap(), vec!["make", "drop"]);
    }

    #[test]
    fn load_graph_defers_unknown_dependency_to_validate() {
        let file = graph_file(
            r#"[{ "name": "a", "operation": "create", "resource_kind": "k", "depends_on": ["ghost"] }]"#,
        );

        let graph = load_graph(file.path()).unwrap();

        assert!(matches!(
            graph.validate(),
            Err(EngineError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn load_graph_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_graph(&dir.path().join("absent.json")).unwrap_err();
        assert!(err.to_string().starts_with("cannot read file"));
    }

    #[test]
    fn load_graph_reports_bad_json() {
        for body in ["not json", r#"[{ "name": "a" }]"#, r#"[{ "name": "a", "operation": "delete", "resource_kind": "k" }]"#] {
            let file = graph_file(body);
            let err = load_graph(file.path()).unwrap_err();
            assert!(err.to_string().starts_with("invalid graph JSON"), "{body}");
        }
    }

    #[tokio::test]
    async fn loaded_graph_runs_against_in_memory_backend() {
        let file = graph_file(
            r#"[
                { "name": "make", "operation": "create", "resource_kind": "tpl",
                  "params": { "id": { "literal": "t1" }, "v": { "literal": 1 } } },
                { "name": "fetch", "operation": "read", "resource_kind": "tpl",
                  "params": { "id": { "ref": { "source_step": "make", "field_path": "id" } } },
                  "depends_on": ["make"] }
            ]"#,
        );
        let graph = load_graph(file.path()).unwrap();

        let report = opts().executor().run(&graph).await.unwrap();

        assert!(report.all_succeeded());
        assert_eq!(report.get("fetch").unwrap().output.as_ref().unwrap()["v"], 1);
    }
}

//! GapLens 命令行
//!
//! 用法：`gaplens [--project ID] [--scope S] [--config PATH] <question…>`
//! 运行一次完整工作流，打印最终状态（JSON）与会话保存位置。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use gaplens::config::load_config;
use gaplens::memory::FileSessionStore;
use gaplens::schema::Scope;
use gaplens::{observability, RunRequest, WorkflowDriver};

#[derive(Parser, Debug)]
#[command(
    name = "gaplens",
    version,
    about = "Skill gap analysis: perception, analysis and decision agents over the team data service"
)]
struct Args {
    /// Restrict the analysis to a single project
    #[arg(long = "project")]
    project_id: Option<String>,

    /// Scope of the recommendation
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,

    /// Extra TOML config layered over config/default.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// The question, e.g. "Who can pick up AWS for the migration?"
    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum ScopeArg {
    Department,
    Team,
    Company,
    Project,
}

impl From<ScopeArg> for Scope {
    fn from(arg: ScopeArg) -> Self {
        match arg {
            ScopeArg::Department => Scope::Department,
            ScopeArg::Team => Scope::Team,
            ScopeArg::Company => Scope::Company,
            ScopeArg::Project => Scope::Project,
        }
    }
}

impl Args {
    fn request(&self) -> RunRequest {
        let mut request = RunRequest::new(self.question.join(" "));
        if let Some(id) = &self.project_id {
            request = request.project(id.clone());
        }
        if let Some(scope) = self.scope {
            request = request.scope(scope.into());
        }
        request
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = Args::parse();
    let cfg = load_config(args.config.clone()).context("Failed to load config")?;

    if cfg.memory.auto_cleanup {
        let store = FileSessionStore::new(&cfg.memory.storage_dir);
        match store.prune_older_than(cfg.memory.retention_days).await {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "pruned expired sessions"),
            Err(e) => tracing::warn!(error = %e, "session cleanup failed"),
        }
    }

    let driver = WorkflowDriver::from_config(&cfg).context("Failed to build workflow")?;

    let outcome = driver.run(args.request()).await.context("Workflow run failed")?;

    let state = serde_json::to_string_pretty(&outcome.state).context("Failed to render state")?;
    println!("{state}");
    match outcome.location {
        Some(location) => println!("session saved: {location}"),
        None => println!("session not saved"),
    }
    Ok(())
}

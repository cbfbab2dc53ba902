//! Two agents, one pipeline: raw `git log --oneline` in, a post out.
//!
//! The tech lead condenses the commits; the writer turns that summary into
//! a single social post. Configuration comes from an optional JSON file
//! (first argument) overlaid with `STAGECHAIN_*` / `OPENAI_API_KEY`.
//!
//! ```sh
//! OPENAI_API_KEY=sk-... cargo run --example changelog_writer
//! ```

use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tracing::info;

use stagechain::prelude::*;

const RAW_COMMITS: &str = "\
a1b2c3d feat: added dark mode support across the entire UI
b2c3d4e feat: introduced smart caching layer, 3x faster dashboard loads
c3d4e5f Merge pull request #42 from team/perf-improvements
d4e5f6a fix: database connection timeout on heavy load
e5f6a7b fix: resolved race condition in real-time notifications";

fn tech_lead() -> Stage {
    Stage::new(
        "tech-lead",
        AgentIdentity::new("Tech Lead")
            .with_role("Technical Summarizer")
            .with_goal("Distill raw commit messages into a developer-friendly summary of user-facing value.")
            .with_model("openai/gpt-5-mini")
            .with_instructions(
                "Skip chore, docs and merge commits. For each feat or fix, say what changed \
                 and why a user should care. Be concise.",
            ),
        "Analyze these raw git commits and summarize the meaningful, user-facing changes.\n\n\
         Raw commits:\n{context}",
    )
}

fn growth_hacker() -> Stage {
    Stage::new(
        "growth-hacker",
        AgentIdentity::new("Growth Hacker")
            .with_role("Developer Social Media Writer")
            .with_goal("Turn technical summaries into posts that read like an engineer sharing something useful.")
            .with_model("openai/gpt-4o")
            .with_instructions(
                "Write ONE post, not a thread. Calm one-line hook, two or three short lines of \
                 context, a short bullet list of changes, then 'Link in the comments'. \
                 No hashtags, no hype words, at most one emoji per line. \
                 Only mention features present in the summary.",
            ),
        "Using this technical summary, write the post announcing this week's updates.\n\n{context}",
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let base = match std::env::args().nth(1) {
        Some(path) => StagechainConfig::from_file(&path)
            .with_context(|| format!("loading config from {path}"))?,
        None => StagechainConfig::default(),
    };
    let config = base.with_env_overrides(std::env::vars())?;
    init_tracing(&config.logging);

    if config.provider.api_key.is_none() {
        bail!("set OPENAI_API_KEY or STAGECHAIN_API_KEY");
    }

    let invoker = OpenAiCompatibleInvoker::new(config.provider.clone())?;
    let pipeline = PipelineBuilder::new("changelog-writer")
        .stage(tech_lead())
        .stage(growth_hacker())
        .invoker(Arc::new(invoker))
        .config(config.executor.clone())
        .event_sink(Arc::new(LoggingEventSink::default()))
        .build()?;

    info!(stages = ?pipeline.stage_names(), "Pipeline ready");

    let run = pipeline.run_with_retry(RAW_COMMITS, &config.retry).await;

    match run.final_output() {
        Some(post) => println!("{post}"),
        None => {
            eprintln!("{}", run.to_json_pretty()?);
            bail!(
                "pipeline failed at {}",
                run.failed_stage().unwrap_or("(cancelled)")
            );
        }
    }
    Ok(())
}

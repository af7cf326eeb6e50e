// src/lib.rs

pub mod artifact;
pub mod cli;
pub mod config;
pub mod context;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod remote;
pub mod state;
pub mod types;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cli::{CliArgs, Command, PlanArgs};
use crate::config::loader::load_and_validate;
use crate::config::model::PipelineConfig;
use crate::context::RunContext;
use crate::dag::StageGraph;
use crate::engine::{Engine, StageOutcome};
use crate::fs::RealFileSystem;
use crate::remote::Services;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - stage order resolution
/// - the run context (graph + state store)
/// - the HTTP service clients and the engine
pub async fn run(args: CliArgs) -> Result<()> {
    let config = load_and_validate(&args.config)?;

    match args.command {
        Command::Plan(plan) => print_plan(&config, &plan),
        Command::Run(run) => {
            // Unknown stages and cycles must fail before the state store opens.
            let graph = StageGraph::build(config.stages.clone())?;
            let requested = requested_or_all(&graph, run.stages);
            let order = graph.resolve_order(&requested)?;

            let mut engine = build_engine(config, run.clean, args.debug)?;
            let outcomes = engine.execute_sequence(&order, run.wait).await?;
            for (stage, outcome) in outcomes {
                match outcome {
                    StageOutcome::Skipped => info!(stage = %stage, "already complete"),
                    StageOutcome::Submitted { thread_ids } => {
                        info!(stage = %stage, ?thread_ids, "submitted")
                    }
                    StageOutcome::Completed => info!(stage = %stage, "completed"),
                }
            }
            info!(run_id = %engine.context().run_id(), "run finished");
            Ok(())
        }
        Command::Display(display) => {
            let graph = StageGraph::build(config.stages.clone())?;
            let stages = requested_or_all(&graph, display.stages);

            let mut engine = build_engine(config, false, args.debug)?;
            engine
                .display_sequence(&stages, display.run_id.as_deref())
                .await?;
            Ok(())
        }
    }
}

fn build_engine(config: PipelineConfig, clean: bool, debug: bool) -> Result<Engine> {
    let services = Services::from_settings(&config.settings)?;
    let ctx = RunContext::new(config, Arc::new(RealFileSystem), clean, debug)?;
    Ok(Engine::new(ctx, services))
}

/// The given stage names, or every defined stage in definition order.
fn requested_or_all(graph: &StageGraph, requested: Vec<String>) -> Vec<String> {
    if requested.is_empty() {
        graph.stage_names().map(str::to_string).collect()
    } else {
        requested
    }
}

/// Dry run: print the execution order, or the whole graph as DOT.
fn print_plan(config: &PipelineConfig, plan: &PlanArgs) -> Result<()> {
    let graph = StageGraph::build(config.stages.clone())?;

    if plan.dot {
        print!("{}", graph.to_dot());
        return Ok(());
    }

    let requested = requested_or_all(&graph, plan.stages.clone());
    let order = graph.resolve_order(&requested)?;

    println!("stagehand plan for {}", config.settings.project_name);
    for (i, name) in order.iter().enumerate() {
        let deps: Vec<&str> = graph
            .dependencies_of(name)
            .into_iter()
            .map(|s| s.name())
            .collect();
        if deps.is_empty() {
            println!("  {}. {name}", i + 1);
        } else {
            println!("  {}. {name} (after {})", i + 1, deps.join(", "));
        }
        if let Some(stage) = graph.get(name) {
            for (resource, directives) in stage.definition().directives_by_resource() {
                println!("       -> {resource} ({} directive(s))", directives.len());
            }
        }
    }
    Ok(())
}

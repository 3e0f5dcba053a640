//! Command-line interface for the finance agent

use agent_core::{AgentResponse, Context};
use agent_finance::{FinanceAgent, FinanceConfig, HealthReport, StreamEvent};
use anyhow::Context as _;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "finance-cli")]
#[command(about = "Ask questions about stocks", long_about = None)]
struct Cli {
    /// JSON configuration file (defaults come from FINANCE_* variables)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Override the classifier similarity threshold
    #[arg(long, global = true)]
    threshold: Option<f32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one query
    Ask { query: String },
    /// Answer one query, printing progress as it happens
    Stream { query: String },
    /// Report component health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    if cli.json {
        agent_utils::init_tracing_json();
    } else {
        agent_utils::init_tracing();
    }

    let config = load_config(&cli)?;
    let agent = Arc::new(
        FinanceAgent::from_config(config)
            .await
            .context("failed to start the finance agent")?,
    );
    info!(mode = %agent.mode(), "Starting finance-cli");

    match cli.command {
        Command::Ask { query } => {
            let response = agent.process_query(&query, &mut Context::new()).await?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}\n", response.content());
                print_trace(&response);
            }
            Ok(exit_code(response.status().is_answer()))
        }
        Command::Stream { query } => stream(&agent, query, cli.json).await,
        Command::Health => {
            let report = agent.health_check().await;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_health(&report);
            }
            Ok(exit_code(report.healthy))
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<FinanceConfig> {
    let mut config = match &cli.config {
        Some(path) => FinanceConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => FinanceConfig::builder().from_env()?.build()?,
    };
    if let Some(threshold) = cli.threshold {
        config.classifier_threshold = threshold;
        config.validate()?;
    }
    Ok(config)
}

async fn stream(agent: &Arc<FinanceAgent>, query: String, json: bool) -> anyhow::Result<ExitCode> {
    let mut rx = agent.process_query_streaming(query);
    let mut stdout = std::io::stdout();
    let mut ok = false;

    while let Some(event) = rx.recv().await {
        if json {
            println!("{}", serde_json::to_string(&event)?);
            if let StreamEvent::Final { response } = &event {
                ok = response.status().is_answer();
            }
            continue;
        }
        match event {
            StreamEvent::Classified { intent, confidence } => {
                eprintln!("[{intent} {confidence:.2}]");
            }
            StreamEvent::ToolStart { name, arguments, .. } => {
                eprintln!("-> {name} {arguments}");
            }
            StreamEvent::ToolEnd {
                name,
                was_cached,
                error,
                ..
            } => match error {
                Some(error) => eprintln!("<- {name} failed: {error}"),
                None if was_cached => eprintln!("<- {name} (cached)"),
                None => eprintln!("<- {name}"),
            },
            StreamEvent::Content { delta } => {
                print!("{delta}");
                stdout.flush()?;
            }
            StreamEvent::Final { response } => {
                println!("\n");
                print_summary(&response);
                ok = response.status().is_answer();
            }
        }
    }
    Ok(exit_code(ok))
}

fn print_trace(response: &AgentResponse) {
    if !response.tool_calls().is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Capability", "Arguments", "Result", "Cached", "ms"]);
        for call in response.tool_calls() {
            let arguments = serde_json::to_string(call.arguments()).unwrap_or_default();
            let outcome = match call.error_message() {
                Some(error) => format!("error: {error}"),
                None => "ok".to_string(),
            };
            table.add_row(vec![
                call.name().to_string(),
                arguments,
                outcome,
                call.was_cached().to_string(),
                call.duration_ms().map_or_else(String::new, |ms| ms.to_string()),
            ]);
        }
        println!("{table}");
    }
    print_summary(response);
}

fn print_summary(response: &AgentResponse) {
    let latency = response
        .latency_ms()
        .map_or_else(String::new, |ms| format!(", {ms} ms"));
    let tokens = response
        .token_usage()
        .map_or_else(String::new, |u| format!(", {} tokens", u.total()));
    println!(
        "{} via {}/{}{latency}{tokens}",
        response.status(),
        response.provider_id(),
        response.model_id()
    );
}

fn print_health(report: &HealthReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Component", "Healthy", "Detail"]);

    table.add_row(vec![
        "classifier".to_string(),
        report.classifier.healthy.to_string(),
        format!(
            "providers [{}], threshold {:.2}, {} cached embeddings",
            report.classifier.providers.join(", "),
            report.classifier.threshold,
            report.classifier.cached_embeddings
        ),
    ]);
    table.add_row(vec![
        format!("cache ({})", report.cache.backend),
        report.cache.healthy.to_string(),
        report.cache.detail.clone(),
    ]);
    for capability in &report.registry.capabilities {
        let detail = match (&capability.last_invocation, capability.enabled) {
            (_, false) => "disabled".to_string(),
            (Some(at), true) => format!("last invoked {at}"),
            (None, true) => "not invoked yet".to_string(),
        };
        table.add_row(vec![
            capability.name.clone(),
            capability.healthy.to_string(),
            detail,
        ]);
    }
    match &report.providers {
        Some(providers) => table.add_row(vec![
            "providers".to_string(),
            providers.healthy.to_string(),
            format!(
                "sequence [{}], configured [{}]",
                providers.sequence.join(", "),
                providers.configured.join(", ")
            ),
        ]),
        None => table.add_row(vec![
            "providers".to_string(),
            "false".to_string(),
            "none configured".to_string(),
        ]),
    };

    println!("{table}");
    println!("mode: {}, healthy: {}", report.mode, report.healthy);
}

fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}

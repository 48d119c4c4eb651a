// crates/malcli/src/main.rs

mod clients;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use clients::{DryRunBackend, Fixtures};
use malcore::{
    AutomationNode, ExecutionEvent, Flow, FlowDefinition, FlowStore, InMemoryFlowStore, Outcome, TriggerContext,
    TriggerType,
};
use malruntime::{AutomationGraph, AutomationRuntime, EventBus, ExecutionSummary, FlowDispatch, RuntimeConfig};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mal")]
#[command(about = "Marketing automation flow runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one flow against an event, or manually with a payload
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        flow: PathBuf,

        /// Path to event JSON file; omit to start the flow manually
        #[arg(short, long)]
        event: Option<PathBuf>,

        /// Manual trigger payload as a JSON string
        #[arg(short, long)]
        payload: Option<String>,

        #[command(flatten)]
        env: EnvArgs,
    },

    /// Route an event to every flow that matches it
    Dispatch {
        /// Path to event JSON file
        #[arg(short, long)]
        event: PathBuf,

        /// Flow JSON files to consider
        #[arg(required = true)]
        flows: Vec<PathBuf>,

        #[command(flatten)]
        env: EnvArgs,
    },

    /// Check a flow's structure and node configs
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Write an example flow and event
    Init {
        /// Output file path for the flow
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

#[derive(clap::Args)]
struct EnvArgs {
    /// Runtime config JSON (limits, concurrency)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Campaign metrics and segment membership served to the dry run
    #[arg(long)]
    fixtures: Option<PathBuf>,

    /// Show verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            flow,
            event,
            payload,
            env,
        } => {
            init_logging(env.verbose);
            run_flow(&flow, event.as_deref(), payload, &env).await?;
        }

        Commands::Dispatch { event, flows, env } => {
            init_logging(env.verbose);
            dispatch_event(&event, &flows, &env).await?;
        }

        Commands::Validate { file } => {
            validate_flow(&file)?;
        }

        Commands::Nodes => {
            list_nodes();
        }

        Commands::Init { output } => {
            create_example_flow(&output)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Runtime over an in-memory store holding `definitions`, with dry-run clients.
async fn build_runtime(
    definitions: Vec<FlowDefinition>,
    env: &EnvArgs,
) -> Result<(Arc<AutomationRuntime>, Arc<InMemoryFlowStore>)> {
    let config: RuntimeConfig = match &env.config {
        Some(path) => read_json(path)?,
        None => RuntimeConfig::default(),
    };
    let fixtures: Fixtures = match &env.fixtures {
        Some(path) => read_json(path)?,
        None => Fixtures::default(),
    };

    let store = Arc::new(InMemoryFlowStore::new());
    for definition in definitions {
        store.insert_definition(definition).await;
    }

    let backend = DryRunBackend::new(fixtures);
    let runtime = AutomationRuntime::new(
        store.clone(),
        Arc::new(malnodes::standard_registry()),
        Arc::new(backend.clients()),
        config,
    );
    Ok((Arc::new(runtime), store))
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionStarted { execution_id, .. } => {
            println!("▶️  Execution {} started", execution_id);
        }
        ExecutionEvent::NodeStarted {
            node_id,
            node_type,
            subtype,
            ..
        } => {
            println!("  ⚡ {} {} ({})", node_type, subtype, node_id);
        }
        ExecutionEvent::NodeCompleted {
            node_id,
            outcome,
            duration_ms,
            ..
        } => match outcome {
            Some(outcome) => println!("  ✅ Node {} -> {} in {}ms", node_id, outcome, duration_ms),
            None => println!("  ✅ Node {} completed in {}ms", node_id, duration_ms),
        },
        ExecutionEvent::NodeFailed { node_id, error, .. } => {
            println!("  ❌ Node {} failed: {}", node_id, error);
        }
        ExecutionEvent::ExecutionFinished {
            status,
            error,
            duration_ms,
            ..
        } => match error {
            Some(error) => println!("🏁 Execution {} after {}ms: {}", status, duration_ms, error),
            None => println!("🏁 Execution {} in {}ms", status, duration_ms),
        },
    }
}

/// Print progress events until every sender is gone.
fn spawn_printer(runtime: &AutomationRuntime) -> tokio::task::JoinHandle<()> {
    let mut events = runtime.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            print_event(&event);
        }
    })
}

async fn print_steps(store: &InMemoryFlowStore, summary: &ExecutionSummary) -> Result<()> {
    println!();
    println!("📊 Execution Summary:");
    println!("   Execution ID: {}", summary.execution_id);
    println!("   Status: {}", summary.status);
    println!("   Steps: {}", summary.steps);
    println!(
        "   Actions: {} (external writes {}, contact actions {})",
        summary.metrics.actions_executed, summary.metrics.external_writes, summary.metrics.contact_actions_performed
    );
    if let Some(error) = &summary.error {
        println!("   Stopped: {}", error);
    }

    let steps = store.get_steps_for_execution(summary.execution_id).await?;
    if !steps.is_empty() {
        println!();
        println!("📤 Step outputs:");
        for step in steps {
            let output = step.output.map(|o| o.to_string()).unwrap_or_default();
            println!("   {} [{:?}] {}", step.node_id, step.status, output);
        }
    }
    Ok(())
}

async fn run_flow(flow_file: &Path, event_file: Option<&Path>, payload: Option<String>, env: &EnvArgs) -> Result<()> {
    println!("🚀 Loading flow from: {}", flow_file.display());
    let definition: FlowDefinition = read_json(flow_file)?;
    let flow_id = definition.flow_id();
    println!("📋 Flow: {}", definition.flow.name);
    println!("   Nodes: {}", definition.nodes.len());
    println!("   Edges: {}", definition.edges.len());
    println!();

    let trigger = match (event_file, payload) {
        (Some(path), _) => read_json::<TriggerContext>(path)?,
        (None, Some(raw)) => TriggerContext::manual(serde_json::from_str(&raw).context("parsing --payload")?)
            .with_user(definition.flow.user_id.clone()),
        (None, None) => TriggerContext::manual(serde_json::json!({})).with_user(definition.flow.user_id.clone()),
    };

    let (runtime, store) = build_runtime(vec![definition], env).await?;
    let printer = spawn_printer(&runtime);

    let result = runtime.start_execution(flow_id, trigger).await;

    drop(runtime);
    printer.await?;

    let summary = result?;
    print_steps(&store, &summary).await
}

async fn dispatch_event(event_file: &Path, flow_files: &[PathBuf], env: &EnvArgs) -> Result<()> {
    let event: TriggerContext = read_json(event_file)?;
    let mut definitions = Vec::with_capacity(flow_files.len());
    for path in flow_files {
        let definition: FlowDefinition = read_json(path)?;
        if !definition.flow.accepts_events() {
            println!("⏸️  {} ({}) is inactive or manual", definition.flow.name, path.display());
        }
        definitions.push(definition);
    }

    println!("📨 Dispatching {} event to {} flow(s)", event.event_type, definitions.len());
    let (runtime, store) = build_runtime(definitions, env).await?;
    let printer = spawn_printer(&runtime);

    let bus = EventBus::new(runtime);
    let report = bus.process(event).await;

    drop(bus);
    printer.await?;

    println!();
    println!("   Matched: {}", report.matched);
    for result in &report.results {
        match result {
            FlowDispatch::Started(summary) => print_steps(&store, summary).await?,
            FlowDispatch::Failed { flow_id, error } => println!("💥 Flow {} failed: {}", flow_id, error),
            FlowDispatch::Skipped { flow_id, reason } => println!("⏭️  Flow {} skipped: {}", flow_id, reason),
        }
    }
    Ok(())
}

fn validate_flow(file: &Path) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let definition: FlowDefinition = read_json(file)?;
    let name = definition.flow.name.clone();
    let graph = AutomationGraph::new(definition.flow_id(), definition.nodes, definition.edges);
    let report = graph.validate();
    let problems = graph.lint_configs(&malnodes::standard_registry());

    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }
    for error in &report.errors {
        println!("   ❌ {}", error);
    }
    for problem in &problems {
        println!("   ❌ {}", problem);
    }

    if !report.is_valid() || !problems.is_empty() {
        bail!("{} has {} problem(s)", name, report.errors.len() + problems.len());
    }

    println!("✅ Flow is valid:");
    println!("   Name: {}", name);
    println!("   Nodes: {}", graph.node_count());
    println!("   Edges: {}", graph.edges().len());
    match graph.topological_sort() {
        Some(order) => {
            let order: Vec<String> = order.iter().map(ToString::to_string).collect();
            println!("   Order: {}", order.join(" -> "));
        }
        None => println!("   Contains cycles; re-entered nodes are skipped at run time"),
    }
    Ok(())
}

fn list_nodes() {
    println!("📦 Available Node Types:");
    println!();

    for handler in malnodes::standard_registry().list_handlers() {
        println!("  • {} ({})", handler.subtype, handler.node_type);
        println!("    {}", handler.description);
    }
}

fn create_example_flow(output: &Path) -> Result<()> {
    let flow = Flow::new("user-1", "Tag engaged openers", TriggerType::Event)
        .active()
        .with_description("Tags contacts who open a campaign with a healthy open rate");
    let mut definition = FlowDefinition::new(flow);
    let flow_id = definition.flow_id();

    let trigger = definition.add_node(
        AutomationNode::trigger(flow_id, "email_open")
            .with_config("campaignId", "c1")
            .with_position(100.0, 100.0),
    );
    let condition = definition.add_node(
        AutomationNode::condition(flow_id, "if_metric_greater")
            .with_config("metric", "openRate")
            .with_config("threshold", 50)
            .with_position(300.0, 100.0),
    );
    let tag = definition.add_node(
        AutomationNode::action(flow_id, "tag_contact")
            .with_config("tag", "engaged")
            .with_position(500.0, 50.0),
    );
    let log = definition.add_node(
        AutomationNode::action(flow_id, "log_event")
            .with_config("message", "Open rate below threshold")
            .with_position(500.0, 150.0),
    );

    definition.connect(trigger, condition);
    definition.connect_on(condition, Outcome::True, tag);
    definition.connect_on(condition, Outcome::False, log);

    std::fs::write(output, serde_json::to_string_pretty(&definition)?)?;

    let event = TriggerContext::new(
        "email_open",
        "email-service",
        serde_json::json!({ "campaignId": "c1", "contactId": "k1" }),
    )
    .with_user("user-1");
    let event_path = output.with_file_name("event.json");
    std::fs::write(&event_path, serde_json::to_string_pretty(&event)?)?;

    let fixtures = serde_json::json!({
        "campaigns": [{ "campaignId": "c1", "status": "sent", "metrics": { "openRate": 62.5 } }],
    });
    let fixtures_path = output.with_file_name("fixtures.json");
    std::fs::write(&fixtures_path, serde_json::to_string_pretty(&fixtures)?)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!(
        "  mal run --flow {} --event {} --fixtures {}",
        output.display(),
        event_path.display(),
        fixtures_path.display()
    );
    Ok(())
}

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use weft_llm::handlers::SimpleTaskHandler;
use weft_llm::nodes::{ExtracterNode, PromptTemplateNode};
use weft_llm::{DEFAULT_TASK_TYPE, EngineConfig, LlmEngine, LlmNode, UserInputMapping};
use weft_message::ControlMessage;

/// Weft - run prompt pipelines over control messages
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Render a prompt template over the columns of a message
  Run {
    /// Path to the message file (JSON), or `-` for stdin
    message_file: PathBuf,

    /// minijinja template rendered once per row
    #[arg(long)]
    template: String,

    /// Payload column passed to the template (repeatable)
    #[arg(long = "input-key", required = true)]
    input_keys: Vec<String>,

    /// Payload column the rendered prompts are written to
    #[arg(long, default_value = "prompt")]
    output_column: String,

    /// Message task queue to drain
    #[arg(long, default_value = DEFAULT_TASK_TYPE)]
    task_type: String,
  },
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("weft=info,weft_llm=info,warn")),
    )
    .with_writer(io::stderr)
    .init();

  let cli = Cli::parse();

  match cli.command {
    Some(Commands::Run {
      message_file,
      template,
      input_keys,
      output_column,
      task_type,
    }) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(run(
        message_file,
        template,
        input_keys,
        output_column,
        EngineConfig { task_type },
      ))?;
    }
    None => {
      println!("weft - use --help to see available commands");
    }
  }

  Ok(())
}

async fn run(
  message_file: PathBuf,
  template: String,
  input_keys: Vec<String>,
  output_column: String,
  config: EngineConfig,
) -> Result<()> {
  let message = load_message(&message_file).await?;
  eprintln!("Loaded message with tasks: {}", message.get_tasks());

  let engine = build_engine(template, input_keys, output_column, config)?;

  let produced = engine
    .run(Arc::new(message))
    .await
    .context("engine run failed")?;

  eprintln!("Produced {} message(s)", produced.len());

  let output: Vec<serde_json::Value> = produced
    .iter()
    .map(|m| {
      serde_json::json!({
        "payload": m.payload(),
        "metadata": m.all_metadata(),
      })
    })
    .collect();

  println!("{}", serde_json::to_string_pretty(&output)?);

  Ok(())
}

/// extracter -> prompts, with the prompts written back into the payload.
fn build_engine(
  template: String,
  input_keys: Vec<String>,
  output_column: String,
  config: EngineConfig,
) -> Result<LlmEngine> {
  let mut pipeline = LlmNode::new();
  pipeline
    .add_node("extracter", vec![], Arc::new(ExtracterNode::new()), false)
    .context("failed to add extracter node")?;
  pipeline
    .add_node(
      "prompts",
      vec![UserInputMapping::from_external("/extracter/*")],
      Arc::new(PromptTemplateNode::new(template, input_keys)),
      true,
    )
    .context("failed to add prompt template node")?;

  let mut engine = LlmEngine::with_config(config, Arc::new(pipeline));
  engine
    .add_task_handler(
      vec![UserInputMapping::new("/prompts", output_column.clone())],
      Arc::new(SimpleTaskHandler::new(vec![output_column])),
    )
    .context("failed to register task handler")?;

  Ok(engine)
}

/// Read a message config; an optional top-level `payload` sets the columns.
async fn load_message(message_file: &Path) -> Result<ControlMessage> {
  let content = if message_file.as_os_str() == "-" {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read message from stdin")?;
    input
  } else {
    tokio::fs::read_to_string(message_file)
      .await
      .with_context(|| format!("failed to read message file: {}", message_file.display()))?
  };

  let config: serde_json::Value = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse message file: {}", message_file.display()))?;

  let message = ControlMessage::from_config(&config).context("invalid message config")?;
  if let Some(payload) = config.get("payload") {
    message.set_payload(payload.clone());
  }

  Ok(message)
}

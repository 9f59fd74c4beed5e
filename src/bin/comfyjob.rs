use clap::{Parser, Subcommand};
use comfyui_job_adapter::utils::prompt_ops::parse_param_pairs;
use comfyui_job_adapter::{ComfyUIClient, Config, JobHandler, JobResult};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "comfyjob", about = "Run image jobs against ComfyUI", version)]
struct Cli {
    /// Override COMFYUI_URL
    #[arg(global = true, long)]
    comfyui_url: Option<String>,

    /// Override WORKFLOWS_DIR
    #[arg(global = true, long, value_name = "DIR")]
    workflows_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one job end to end and print its result
    Run {
        /// Workflow name under <WORKFLOWS_DIR>/<name>.json
        #[arg(long, required_unless_present = "job", conflicts_with = "job")]
        workflow: Option<String>,
        /// Job id; a random one is generated when omitted
        #[arg(long)]
        id: Option<String>,
        /// Parameters as key=value (repeatable). Values are parsed as JSON when possible.
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
        /// Read the whole job document ({id, input: {workflow_name, params}}) from a file
        #[arg(long, value_name = "PATH")]
        job: Option<PathBuf>,
    },
    /// Print the prompt graph a job would submit, without submitting it
    Render {
        /// Workflow name under <WORKFLOWS_DIR>/<name>.json
        #[arg(long)]
        workflow: String,
        /// Job id used for the default filename prefix
        #[arg(long, default_value = "render")]
        id: String,
        /// Parameters as key=value (repeatable)
        #[arg(long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
    /// List available workflow templates
    Workflows,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load env and parse CLI
    Config::dotenv_load();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut conf = Config::new()?;
    if let Some(url) = cli.comfyui_url {
        conf.comfyui_url = url;
    }
    if let Some(dir) = cli.workflows_dir {
        conf.workflows_dir = dir;
    }

    let engine = Arc::new(ComfyUIClient::new(conf.comfyui_url.clone()));
    let handler = JobHandler::new(&conf, engine);

    match cli.command {
        Commands::Run { workflow, id, params, job } => {
            let raw: Value = match (job, workflow) {
                (Some(path), _) => {
                    let data = tokio::fs::read_to_string(&path).await?;
                    serde_json::from_str(&data)?
                }
                (None, Some(name)) => {
                    let params = parse_param_pairs(&params)?;
                    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                    json!({ "id": id, "input": { "workflow_name": name, "params": params } })
                }
                (None, None) => {
                    eprintln!("Must provide either --workflow <name> or --job <path>");
                    std::process::exit(2);
                }
            };
            let result = handler.handle(&raw).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if let JobResult::Failure(_) = result {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Render { workflow, id, params } => {
            let params = parse_param_pairs(&params)?;
            match handler.resolve(&id, &workflow, &params).await {
                Ok(resolved) => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "prompt": resolved.graph }))?);
                    eprintln!("filename_prefix: {}", resolved.filename_prefix);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("Error: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Workflows => {
            for name in handler.store().list().await? {
                println!("{}", name);
            }
            Ok(())
        }
    }
}

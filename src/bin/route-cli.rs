//! Offline inspection of a deployment.
//!
//! `validate` loads the configuration and deployment and reports every
//! problem; `resolve` routes a single request and prints where it lands.

use std::path::PathBuf;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method};
use clap::{Parser, Subcommand};

use edge_router::config::{load_config, validate_deployment};
use edge_router::{handle_request, load_deployment, EdgeRequest, RuntimeEnv};

#[derive(Parser)]
#[command(name = "route-cli")]
#[command(about = "Validate a deployment or trace how it routes a request", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "edge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration and deployment
    Validate,
    /// Route a request and print the resolved state as JSON
    Resolve {
        /// Absolute request URL
        url: String,
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,
        /// Request header as `name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let env = Arc::new(RuntimeEnv::from_config(&config)?);
    let deployment = load_deployment(&config.manifest.routes_path, &config.manifest.build_output_path)?;

    match cli.command {
        Commands::Validate => match validate_deployment(&deployment, env.functions()) {
            Ok(()) => {
                println!(
                    "ok: {} routes, {} outputs",
                    deployment.routes().iter().count(),
                    deployment.output().len()
                );
            }
            Err(errors) => {
                for error in &errors {
                    eprintln!("error: {error}");
                }
                std::process::exit(1);
            }
        },
        Commands::Resolve { url, method, headers } => {
            let mut request = EdgeRequest::get(&url)?;
            request.method = Method::from_bytes(method.to_uppercase().as_bytes())?;
            for header in &headers {
                let (name, value) = header
                    .split_once(':')
                    .ok_or_else(|| format!("header {header:?} is not `name: value`"))?;
                request.headers.append(
                    HeaderName::from_bytes(name.trim().as_bytes())?,
                    HeaderValue::from_str(value.trim())?,
                );
            }

            let resolved = handle_request(&deployment, &env, &mut request).await;
            println!("{}", serde_json::to_string_pretty(&resolved.summary())?);
        }
    }

    Ok(())
}

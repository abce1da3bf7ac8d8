// SPDX-License-Identifier: MIT

//! Command-line front end for inspecting graph definitions.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};

use trellis_rs::graph::{GraphLoader, GraphValidator};
use trellis_rs::GraphError;

#[derive(Parser)]
#[command(name = "trellis", version, about = "Declarative agent-graph engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List graph definitions under a directory
    List {
        /// Directory containing graph definition files
        #[arg(long, default_value = "graphs")]
        path: PathBuf,
    },
    /// Load and validate a graph definition
    Validate {
        /// Directory containing graph definition files
        #[arg(long, default_value = "graphs")]
        path: PathBuf,
        /// Graph name (file stem, no extension)
        name: String,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match cli.command {
        Command::List { path } => {
            let loader = GraphLoader::new(&path);
            let names = loader
                .list_graphs()
                .with_context(|| format!("listing graphs under {}", path.display()))?;
            if names.is_empty() {
                println!("no graph definitions under {}", path.display());
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Validate { path, name } => {
            let loader = GraphLoader::new(&path).with_validator(GraphValidator::new());
            match loader.load(&name) {
                Ok(def) => {
                    println!(
                        "{} v{}: {} node(s), {} edge(s) - valid",
                        def.metadata.name,
                        def.metadata.version,
                        def.spec.nodes.len(),
                        def.spec.edges.len()
                    );
                    Ok(ExitCode::SUCCESS)
                }
                Err(GraphError::Validation { name, errors }) => {
                    eprintln!("graph '{}' is invalid:", name);
                    for issue in &errors {
                        eprintln!("  {}", issue);
                    }
                    Ok(ExitCode::FAILURE)
                }
                Err(other) => Err(other.into()),
            }
        }
    }
}

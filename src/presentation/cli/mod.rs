pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loomwork")]
#[command(author = "Loomwork Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Data-driven workflow orchestrator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Solve and print the execution plan for a set of targets, without running anything")]
    Plan {
        #[arg(short, long, value_name = "DIR", help = "Workspace directory")]
        workspace: PathBuf,

        #[arg(short, long, value_name = "DIR", help = "Module descriptor directory")]
        modules: PathBuf,

        #[arg(short, long, value_name = "ITEM", help = "Target item key(s) to plan for", num_args = 1..)]
        target: Vec<String>,
    },

    #[command(about = "Run the workflow to completion (or until interrupted)")]
    Run {
        #[arg(short, long, value_name = "DIR", help = "Workspace directory")]
        workspace: PathBuf,

        #[arg(short, long, value_name = "DIR", help = "Module descriptor directory")]
        modules: PathBuf,

        #[arg(short, long, value_name = "ITEM", help = "Target item key(s) to produce", num_args = 1..)]
        target: Vec<String>,

        #[arg(short, long, value_name = "FILE", help = "JSON file of given item key -> value")]
        given: PathBuf,
    },

    #[command(about = "Invalidate the outputs of one or more modules and everything downstream of them")]
    Invalidate {
        #[arg(short, long, value_name = "DIR", help = "Workspace directory")]
        workspace: PathBuf,

        #[arg(short, long, value_name = "DIR", help = "Module descriptor directory")]
        modules: PathBuf,

        #[arg(long, value_name = "ITEM", help = "Item key(s) whose producing modules (and everything downstream) to invalidate", num_args = 1..)]
        item: Vec<String>,
    },
}

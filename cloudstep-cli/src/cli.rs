use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cloudstep_provisioning::Operation;

/// Cloudstep - resumable provisioning for cloud database resources
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Perform exactly one step of an operation and print the response
    Step {
        /// Resource family (cluster, stream-processor, private-endpoint, export-job)
        family: String,

        /// Operation (create, update, delete)
        #[arg(value_parser = parse_operation)]
        operation: Operation,

        /// Path to the resource model JSON
        #[arg(short, long)]
        model: PathBuf,

        /// Path to the continuation context returned by the previous step
        #[arg(short, long)]
        context: Option<PathBuf>,
    },

    /// Step repeatedly until the operation reaches a terminal outcome
    Run {
        /// Resource family (cluster, stream-processor, private-endpoint, export-job)
        family: String,

        /// Operation (create, update, delete)
        #[arg(value_parser = parse_operation)]
        operation: Operation,

        /// Path to the resource model JSON
        #[arg(short, long)]
        model: PathBuf,

        /// Give up after this many steps
        #[arg(long, default_value = "500")]
        max_steps: usize,
    },

    /// Read the current state of one resource
    Read {
        family: String,

        /// Path to the resource model JSON
        #[arg(short, long)]
        model: PathBuf,
    },

    /// List resources under the parent named in the model
    List {
        family: String,

        /// Path to a model JSON naming the parent (projectId, workspaceName, clusterName)
        #[arg(short, long)]
        model: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Show the effective configuration
    Config,
}

fn parse_operation(raw: &str) -> Result<Operation, String> {
    raw.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_arguments() {
        let args = Args::try_parse_from([
            "cloudstep",
            "step",
            "stream-processor",
            "create",
            "--model",
            "sp.json",
            "--context",
            "ctx.json",
        ])
        .unwrap();
        match args.mode {
            Mode::Step {
                family,
                operation,
                model,
                context,
            } => {
                assert_eq!(family, "stream-processor");
                assert_eq!(operation, Operation::Create);
                assert_eq!(model, PathBuf::from("sp.json"));
                assert_eq!(context, Some(PathBuf::from("ctx.json")));
            }
            other => panic!("unexpected mode {:?}", other),
        }
    }

    #[test]
    fn test_read_is_not_a_resumable_operation() {
        let err = Args::try_parse_from(["cloudstep", "run", "cluster", "read", "-m", "c.json"]).unwrap_err();
        assert!(err.to_string().contains("unknown operation: read"));
    }
}

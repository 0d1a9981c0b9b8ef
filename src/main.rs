//! destilar CLI
//!
//! Interactive decision-tree distillation for next-activity prediction.
//!
//! # Usage
//!
//! ```bash
//! # Inspect an event log
//! destilar stats events.csv
//!
//! # Encode into a session
//! destilar encode --session s1 --csv events.csv --categorical resource
//!
//! # Train, distill, inspect
//! destilar train --session s1 --epochs 10
//! destilar distill --session s1 --ccp-alpha 0.001
//! destilar show --session s1
//!
//! # Edit the tree, then fine-tune the network toward it
//! destilar cut --session s1 --node-id 4 --direction auto
//! destilar retrain --session s1 --node-id 2
//! destilar finetune --session s1 --mode changed_complete
//!
//! # Or run encode → train → distill from a spec
//! destilar run pipeline.yaml --session s1
//! ```

use clap::Parser;
use destilar::cli::{run_command, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

//! Requests ten study notes as JSON, validates every note and prints them.
use std::process::ExitCode;

use clap::Parser;
use study_lab::notes::{DEFAULT_NOTES_MODEL, NOTE_COUNT};
use study_lab::observability::init_observability;
use study_lab::prelude::*;
use study_lab_cli::{StateArgs, build_lab, load_env, report_failure, write_notes};

#[derive(Parser, Debug)]
#[command(name = "lab-notes", about = "Generate schema-validated study notes")]
struct Cli {
    /// Chat model used for generation.
    #[arg(long, default_value = DEFAULT_NOTES_MODEL)]
    model: String,
    /// Sampling temperature (0.0 - 2.0).
    #[arg(long)]
    temperature: Option<f32>,
    /// Reject responses whose `notes` array has a different length.
    #[arg(long)]
    expect_count: Option<usize>,
    /// Extra requests allowed after a wrong-shape response.
    #[arg(long, default_value_t = 0)]
    shape_retries: u32,
    #[command(flatten)]
    state: StateArgs,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    load_env();
    init_observability();
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_failure(&err),
    }
}

async fn run(cli: Cli) -> Result<(), LabError> {
    let lab = build_lab(PollPolicy::default())?;
    let state = cli.state.store()?.load()?;

    println!("Asking the assistant to generate {NOTE_COUNT} exam notes...\n");
    let mut request = lab
        .notes(&state)
        .model(cli.model)
        .shape_retries(cli.shape_retries);
    if let Some(temperature) = cli.temperature {
        request = request.temperature(temperature);
    }
    if let Some(count) = cli.expect_count {
        request = request.expected_count(count);
    }
    let notes = request.generate().await?;

    write_notes(&mut std::io::stdout().lock(), &notes)
        .map_err(|e| LabError::Io(format!("printing notes: {e}")))
}

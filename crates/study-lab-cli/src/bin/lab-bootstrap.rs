//! Creates the study assistant, indexes one document and writes the state file.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use study_lab::bootstrap::{
    DEFAULT_ASSISTANT_MODEL, DEFAULT_ASSISTANT_NAME, DEFAULT_VECTOR_STORE_NAME,
};
use study_lab::observability::init_observability;
use study_lab::prelude::*;
use study_lab_cli::{PollArgs, StateArgs, abort_on_ctrl_c, build_lab, load_env, report_failure};

#[derive(Parser, Debug)]
#[command(name = "lab-bootstrap", about = "Create the assistant and index the study document")]
struct Cli {
    /// Document to upload into the vector store.
    #[arg(long, env = "STUDY_LAB_DOCUMENT")]
    document: PathBuf,
    /// Model used by the assistant.
    #[arg(long, default_value = DEFAULT_ASSISTANT_MODEL)]
    model: String,
    /// Display name of the assistant.
    #[arg(long, default_value = DEFAULT_ASSISTANT_NAME)]
    name: String,
    /// Display name of the vector store.
    #[arg(long, default_value = DEFAULT_VECTOR_STORE_NAME)]
    vector_store_name: String,
    #[command(flatten)]
    poll: PollArgs,
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
    println!("Study lab - assistant bootstrap");
    let lab = build_lab(cli.poll.policy())?;
    let store = cli.state.store()?;
    let plan = BootstrapPlan::new(cli.document)
        .model(cli.model)
        .assistant_name(cli.name)
        .vector_store_name(cli.vector_store_name);

    let report = lab
        .bootstrap(plan, store)
        .abort_signal(abort_on_ctrl_c())
        .on_step(|step| match step {
            BootstrapStep::AssistantCreated(id) => println!("Created assistant: {id}"),
            BootstrapStep::VectorStoreCreated(id) => println!("Created vector store: {id}"),
            BootstrapStep::DocumentIndexed { file_id, status } => {
                println!("Indexed document {file_id} (status={status})")
            }
            BootstrapStep::VectorStoreAttached => {
                println!("Attached vector store to the assistant's file_search")
            }
            BootstrapStep::StateWritten(path) => println!("Wrote {}", path.display()),
        })
        .run()
        .await?;

    println!(
        "\nassistant_id={} vector_store_id={}",
        report.state.assistant_id, report.state.vector_store_id
    );
    println!("You can now run `lab-ask` and `lab-notes`.");
    Ok(())
}

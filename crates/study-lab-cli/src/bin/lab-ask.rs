//! Asks the bootstrapped assistant one question and prints the answer with
//! its file citations.
use std::io::{BufRead as _, Write as _};
use std::process::ExitCode;

use clap::Parser;
use study_lab::observability::init_observability;
use study_lab::prelude::*;
use study_lab_cli::{
    PollArgs, StateArgs, abort_on_ctrl_c, accept_question, build_lab, load_env, report_failure,
    write_answer,
};

#[derive(Parser, Debug)]
#[command(name = "lab-ask", about = "Ask the study assistant a question")]
struct Cli {
    /// Question text; prompted for interactively when omitted.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    question: Vec<String>,
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
        Ok(code) => code,
        Err(err) => report_failure(&err),
    }
}

async fn run(cli: Cli) -> Result<ExitCode, LabError> {
    let lab = build_lab(cli.poll.policy())?;
    let state = cli.state.store()?.load()?;

    let raw = if cli.question.is_empty() {
        prompt_question()?
    } else {
        cli.question.join(" ")
    };
    let question = match accept_question(&raw, &mut std::io::stdout()) {
        Ok(question) => question,
        Err(status) => return Ok(ExitCode::from(status)),
    };

    println!("\nAsking the assistant: \"{question}\"\n");
    println!("Waiting for the run to finish...\n");
    let answer = lab
        .ask(&state)
        .question(question)
        .abort_signal(abort_on_ctrl_c())
        .on_status(|status| println!("  - current status: {status}"))
        .send()
        .await?;

    write_answer(&mut std::io::stdout().lock(), &answer)
        .map_err(|e| LabError::Io(format!("printing answer: {e}")))?;
    Ok(ExitCode::SUCCESS)
}

fn prompt_question() -> Result<String, LabError> {
    print!("Enter your study question: ");
    std::io::stdout()
        .flush()
        .map_err(|e| LabError::Io(format!("flushing stdout: {e}")))?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| LabError::Io(format!("reading question from stdin: {e}")))?;
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_words_are_collected_in_order() {
        let cli = Cli::try_parse_from(["lab-ask", "What", "is", "--attention?"]).expect("parse");
        assert_eq!(cli.question, vec!["What", "is", "--attention?"]);
    }

    #[test]
    fn whitespace_only_arguments_exit_with_status_one() {
        let cli = Cli::try_parse_from(["lab-ask", "  ", " "]).expect("parse");
        let mut out = Vec::new();
        assert_eq!(accept_question(&cli.question.join(" "), &mut out), Err(1));
    }

    #[test]
    fn no_arguments_means_interactive() {
        let cli = Cli::try_parse_from(["lab-ask", "--timeout-secs", "60"]).expect("parse");
        assert!(cli.question.is_empty());
        assert_eq!(cli.poll.timeout_secs, 60);
    }
}

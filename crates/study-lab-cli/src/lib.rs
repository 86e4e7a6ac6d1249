//! Shared plumbing for the `lab-*` binaries: environment loading, state file
//! selection, lab construction and the text they print.
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use study_lab::prelude::*;
use study_lab::vendors::openai::OpenAiLabBuilderExt;

/// Loads `.env` from the working directory (if present) into the process
/// environment. Existing variables win.
pub fn load_env() {
    if let Err(err) = dotenvy::dotenv()
        && !err.not_found()
    {
        eprintln!("warning: ignoring unreadable .env file: {err}");
    }
}

/// Selects the local state file.
#[derive(clap::Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StateArgs {
    /// Explicit state file path.
    #[arg(long, env = "STUDY_LAB_STATE", conflicts_with = "profile")]
    pub state: Option<PathBuf>,
    /// Profile name; uses `config.<profile>.json` in the working directory.
    #[arg(long, env = "STUDY_LAB_PROFILE")]
    pub profile: Option<String>,
}

impl StateArgs {
    pub fn store(&self) -> Result<StateStore, LabError> {
        match &self.state {
            Some(path) => Ok(StateStore::at(path)),
            None => StateStore::for_profile(".", self.profile.as_deref()),
        }
    }
}

/// Wait policy flags shared by commands that poll remote jobs.
#[derive(clap::Args, Debug, Clone, PartialEq, Eq)]
pub struct PollArgs {
    /// Give up waiting after this many seconds.
    #[arg(long, default_value_t = 300)]
    pub timeout_secs: u64,
    /// Longest pause between two status checks, in seconds.
    #[arg(long, default_value_t = 8)]
    pub max_interval_secs: u64,
}

impl PollArgs {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy::default()
            .timeout(Duration::from_secs(self.timeout_secs))
            .max_interval(Duration::from_secs(self.max_interval_secs))
    }
}

/// Builds a lab backed by OpenAI, failing fast on a missing credential.
pub fn build_lab(poll: PollPolicy) -> Result<Lab, LabError> {
    Lab::builder().openai_from_env()?.poll_policy(poll).build()
}

/// Returns a signal that fires on the first Ctrl-C.
///
/// Must be called from inside a tokio runtime.
pub fn abort_on_ctrl_c() -> AbortSignal {
    let (handle, signal) = abort_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            handle.abort();
        }
    });
    signal
}

/// Exit status of `lab-ask` when no question was given.
pub const NO_QUESTION_STATUS: u8 = 1;

/// Returns the trimmed question, or prints the refusal and returns the exit
/// status to use when nothing is left after trimming.
pub fn accept_question(raw: &str, out: &mut impl Write) -> Result<String, u8> {
    let question = raw.trim();
    if question.is_empty() {
        let _ = writeln!(out, "No question provided. Exiting.");
        return Err(NO_QUESTION_STATUS);
    }
    Ok(question.to_string())
}

pub fn write_answer(out: &mut impl Write, answer: &Answer) -> io::Result<()> {
    writeln!(out, "Run {} completed.\n", answer.run_id)?;
    writeln!(out, "Assistant says:\n")?;
    writeln!(out, "{}", answer.text.trim())?;
    writeln!(out, "\n-- end of answer --\n")?;
    if !answer.citations.is_empty() {
        writeln!(out, "Citations used:")?;
        for citation in &answer.citations {
            writeln!(
                out,
                "  - Cited file: {} (file_id={})",
                citation.filename, citation.file_id
            )?;
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn write_notes(out: &mut impl Write, notes: &[Note]) -> io::Result<()> {
    writeln!(out, "Successfully validated {} notes. Here they are:\n", notes.len())?;
    for note in notes {
        writeln!(out, "{note}\n")?;
    }
    Ok(())
}

/// Writes the diagnostic an operator needs for `err` (service error payload,
/// raw model output or per-note issues). Other errors have no extra detail.
pub fn write_failure(out: &mut impl Write, err: &LabError) -> io::Result<()> {
    match err {
        LabError::RunFailed { last_error, .. } => {
            let payload =
                serde_json::to_string_pretty(last_error).unwrap_or_else(|_| "null".into());
            writeln!(out, "Run failed with error object:")?;
            writeln!(out, "{payload}")?;
        }
        LabError::MalformedOutput {
            stage: OutputStage::Parse,
            raw,
            ..
        } => {
            writeln!(out, "Failed to parse JSON returned by the model:")?;
            writeln!(out, "{raw}")?;
        }
        LabError::MalformedOutput { raw, .. } => {
            writeln!(out, "Unexpected JSON shape returned by the model:")?;
            writeln!(out, "{raw}")?;
        }
        LabError::InvalidNotes(issues) => {
            writeln!(out, "Validation errors occurred while parsing notes:\n")?;
            for issue in issues {
                let problems = serde_json::to_string_pretty(&issue.problems)
                    .unwrap_or_else(|_| issue.to_string());
                writeln!(out, "Error parsing note at index {}:", issue.index)?;
                writeln!(out, "{problems}\n")?;
            }
        }
        LabError::Provider(provider) => {
            writeln!(out, "Remote call '{}' failed:", provider.operation())?;
            writeln!(out, "{}", provider.message())?;
        }
        _ => {}
    }
    Ok(())
}

/// Prints the failure diagnostic on stdout and the error on stderr, then
/// returns the process exit code.
pub fn report_failure(err: &LabError) -> ExitCode {
    if let Err(io_err) = write_failure(&mut io::stdout().lock(), err) {
        eprintln!("warning: could not print failure details: {io_err}");
    }
    eprintln!("error: {err}");
    ExitCode::FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::Path;
    use study_lab::model::{RunId, RunLastError};
    use study_lab::notes::validate_notes;
    use study_lab::{Citation, ProviderError};

    fn rendered(write: impl FnOnce(&mut Vec<u8>) -> io::Result<()>) -> String {
        let mut out = Vec::new();
        write(&mut out).expect("write");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn explicit_state_path_wins() {
        let args = StateArgs {
            state: Some(PathBuf::from("/tmp/lab/state.json")),
            profile: None,
        };
        assert_eq!(
            args.store().expect("store").path(),
            Path::new("/tmp/lab/state.json")
        );
    }

    #[test]
    fn profile_selects_namespaced_file() {
        let args = StateArgs {
            state: None,
            profile: Some("exam".into()),
        };
        assert_eq!(
            args.store().expect("store").path(),
            Path::new("./config.exam.json")
        );
        assert!(
            StateArgs {
                state: None,
                profile: Some("a/b".into())
            }
            .store()
            .is_err()
        );
    }

    #[test]
    fn poll_args_map_to_policy() {
        let policy = PollArgs {
            timeout_secs: 30,
            max_interval_secs: 4,
        }
        .policy();
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert_eq!(policy.max_interval, Duration::from_secs(4));
        assert!(policy.validate().is_ok());
    }

    #[test]
    fn build_lab_needs_a_credential() {
        if std::env::var("OPENAI_API_KEY").is_ok_and(|key| !key.trim().is_empty()) {
            eprintln!("skipping missing-credential test (OPENAI_API_KEY set)");
            return;
        }
        assert!(matches!(
            build_lab(PollPolicy::default()),
            Err(LabError::Config(msg)) if msg.contains("OPENAI_API_KEY")
        ));
    }

    #[test]
    fn blank_question_prints_refusal_and_exit_status_one() {
        let mut out = Vec::new();
        assert_eq!(accept_question(" \t\n", &mut out), Err(1));
        assert_eq!(
            String::from_utf8(out).expect("utf8"),
            "No question provided. Exiting.\n"
        );

        let mut out = Vec::new();
        assert_eq!(
            accept_question("  What is attention?  ", &mut out),
            Ok("What is attention?".to_string())
        );
        assert!(out.is_empty());
    }

    #[test]
    fn failed_run_prints_service_error_payload() {
        let err = LabError::RunFailed {
            run_id: RunId::new("run_1"),
            status: RunStatus::Failed,
            last_error: Some(RunLastError {
                code: "rate_limit_exceeded".into(),
                message: "You exceeded your current quota.".into(),
            }),
        };
        let text = rendered(|out| write_failure(out, &err));
        assert!(text.starts_with("Run failed with error object:\n"));
        assert!(text.contains("\"code\": \"rate_limit_exceeded\""));
        assert!(text.contains("You exceeded your current quota."));
    }

    #[test]
    fn one_bad_note_prints_exactly_one_issue_and_no_notes() {
        let mut items: Vec<_> = (1..=10)
            .map(|id| json!({"id": id, "heading": "h", "summary": "s"}))
            .collect();
        items[6]["summary"] = json!("x".repeat(151));
        let issues = validate_notes(&items).expect_err("invalid");
        let text = rendered(|out| write_failure(out, &LabError::InvalidNotes(issues)));

        assert_eq!(text.matches("Error parsing note at index").count(), 1);
        assert!(text.contains("Error parsing note at index 6:"));
        assert!(text.contains("\"field\": \"summary\""));
        assert!(!text.contains("Note 1:"));
        assert!(!text.contains("Successfully validated"));
    }

    #[test]
    fn parse_failure_echoes_raw_text() {
        let raw = "{\"notes\": [{\"id\": 1,";
        let err = LabError::MalformedOutput {
            stage: OutputStage::Parse,
            message: "EOF while parsing".into(),
            raw: raw.into(),
        };
        let text = rendered(|out| write_failure(out, &err));
        assert_eq!(text, format!("Failed to parse JSON returned by the model:\n{raw}\n"));
    }

    #[test]
    fn provider_failure_names_the_operation() {
        let err: LabError =
            ProviderError::provider("create_run", "status 401: invalid key", Some(401)).into();
        let text = rendered(|out| write_failure(out, &err));
        assert_eq!(text, "Remote call 'create_run' failed:\nstatus 401: invalid key\n");
    }

    #[test]
    fn answer_lists_every_citation() {
        let answer = Answer {
            run_id: RunId::new("run_1"),
            text: "  Attention weighs tokens.\n".into(),
            citations: vec![
                Citation {
                    file_id: "file_a".into(),
                    filename: "attention.pdf".into(),
                },
                Citation {
                    file_id: "file_a".into(),
                    filename: "attention.pdf".into(),
                },
            ],
        };
        let text = rendered(|out| write_answer(out, &answer));
        assert!(text.contains("Assistant says:\n\nAttention weighs tokens.\n"));
        assert_eq!(
            text.matches("  - Cited file: attention.pdf (file_id=file_a)").count(),
            2
        );
    }

    #[test]
    fn notes_are_printed_with_blank_line_between() {
        let notes = vec![Note {
            id: 1,
            heading: "Attention".into(),
            summary: "Weighs tokens.".into(),
            page_ref: Some(3),
        }];
        let text = rendered(|out| write_notes(out, &notes));
        assert_eq!(
            text,
            "Successfully validated 1 notes. Here they are:\n\n\
             Note 1: Attention\n  Summary: Weighs tokens.\n  Page Ref: 3\n\n"
        );
    }
}

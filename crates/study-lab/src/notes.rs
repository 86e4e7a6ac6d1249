//! Structured note generation with per-element schema validation.
//!
//! The remote JSON mode only guarantees syntactically plausible output, so the
//! response goes through three gates: parse, top-level shape, and per-note
//! validation. Any failure rejects the whole batch.
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{Instrument as _, debug, error, info, info_span, warn};

use crate::backend::JsonChatRequest;
use crate::errors::{LabError, OutputStage};
use crate::lab::LabInner;
use crate::state::LabState;

/// Number of notes the instruction asks for.
pub const NOTE_COUNT: usize = 10;
pub const NOTE_ID_MIN: i64 = 1;
pub const NOTE_ID_MAX: i64 = 10;
/// Maximum summary length in characters.
pub const SUMMARY_MAX_CHARS: usize = 150;
pub const DEFAULT_NOTES_MODEL: &str = "gpt-4o-mini";

pub const NOTES_SYSTEM_PROMPT: &str = "You are a study summarizer. \
Return exactly 10 unique notes that will help prepare for the exam. \
Respond only with a valid JSON object of the form {\"notes\": [...]} and nothing else.\n\n\
Each note must be an object with the keys: \
`id` (integer 1-10), `heading` (string), `summary` (string, at most 150 characters), \
`page_ref` (optional integer page number in the source document). \
Do NOT include any additional keys or text.";

/// A validated study note.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Note {
    pub id: u8,
    pub heading: String,
    pub summary: String,
    pub page_ref: Option<i64>,
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Note {}: {}", self.id, self.heading)?;
        writeln!(f, "  Summary: {}", self.summary)?;
        match self.page_ref {
            Some(page) => write!(f, "  Page Ref: {page}"),
            None => write!(f, "  Page Ref: none"),
        }
    }
}

/// One rejected field of a note.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FieldProblem {
    pub field: String,
    pub message: String,
}

/// Every problem found in the note at `index` of the `notes` array.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct NoteIssue {
    pub index: usize,
    pub problems: Vec<FieldProblem>,
}

impl fmt::Display for NoteIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "note at index {}:", self.index)?;
        for problem in &self.problems {
            write!(f, " [{}] {};", problem.field, problem.message)?;
        }
        Ok(())
    }
}

/// Parses the raw response and returns the elements of its `notes` array.
pub fn parse_notes_payload(raw: &str) -> Result<Vec<Value>, LabError> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| LabError::MalformedOutput {
        stage: OutputStage::Parse,
        message: format!("response is not valid JSON: {e}"),
        raw: raw.to_string(),
    })?;
    let shape_error = |message: &str| LabError::MalformedOutput {
        stage: OutputStage::Shape,
        message: message.to_string(),
        raw: raw.to_string(),
    };
    let Value::Object(mut top) = parsed else {
        return Err(shape_error("expected a top-level JSON object"));
    };
    match top.remove("notes") {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(shape_error("top-level 'notes' is not an array")),
        None => Err(shape_error("expected a top-level 'notes' array")),
    }
}

/// Validates every element independently.
///
/// Returns all notes when every element is valid, otherwise every issue found.
pub fn validate_notes(items: &[Value]) -> Result<Vec<Note>, Vec<NoteIssue>> {
    let mut notes = Vec::with_capacity(items.len());
    let mut issues = Vec::new();
    for (index, item) in items.iter().enumerate() {
        match validate_note(item) {
            Ok(note) => notes.push(note),
            Err(problems) => issues.push(NoteIssue { index, problems }),
        }
    }
    if issues.is_empty() {
        Ok(notes)
    } else {
        Err(issues)
    }
}

fn validate_note(item: &Value) -> Result<Note, Vec<FieldProblem>> {
    let Value::Object(fields) = item else {
        return Err(vec![problem("note", "expected an object")]);
    };
    let mut problems = Vec::new();

    let id = match fields.get("id") {
        None | Some(Value::Null) => {
            problems.push(problem("id", "field required"));
            None
        }
        Some(value) => match lax_int(value) {
            LaxInt::Int(id) if (NOTE_ID_MIN..=NOTE_ID_MAX).contains(&id) => u8::try_from(id).ok(),
            LaxInt::Int(id) => {
                problems.push(id_out_of_range(&id.to_string()));
                None
            }
            LaxInt::OutOfRange(text) => {
                problems.push(id_out_of_range(&text));
                None
            }
            LaxInt::NotInteger => {
                problems.push(problem("id", "must be an integer"));
                None
            }
        },
    };

    let heading = required_string(fields.get("heading"), "heading", &mut problems);

    let summary = required_string(fields.get("summary"), "summary", &mut problems).filter(|s| {
        let len = s.chars().count();
        if len > SUMMARY_MAX_CHARS {
            problems.push(problem(
                "summary",
                &format!("must be at most {SUMMARY_MAX_CHARS} characters, got {len}"),
            ));
            false
        } else {
            true
        }
    });

    let page_ref = match fields.get("page_ref") {
        None | Some(Value::Null) => Some(None),
        Some(value) => match lax_int(value) {
            LaxInt::Int(page) => Some(Some(page)),
            LaxInt::OutOfRange(text) => {
                problems.push(problem(
                    "page_ref",
                    &format!("{text} does not fit in a 64-bit integer"),
                ));
                None
            }
            LaxInt::NotInteger => {
                problems.push(problem("page_ref", "must be an integer or null"));
                None
            }
        },
    };

    match (id, heading, summary, page_ref) {
        (Some(id), Some(heading), Some(summary), Some(page_ref)) if problems.is_empty() => {
            Ok(Note {
                id,
                heading,
                summary,
                page_ref,
            })
        }
        _ => Err(problems),
    }
}

/// Integer reading of a JSON value. Integral floats, decimal strings and
/// booleans count as integers, as in lax schema validation.
#[derive(Debug, PartialEq, Eq)]
enum LaxInt {
    Int(i64),
    OutOfRange(String),
    NotInteger,
}

fn lax_int(value: &Value) -> LaxInt {
    // 2^63 as f64; every integral f64 below it converts exactly.
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0;
    match value {
        Value::Bool(flag) => LaxInt::Int(i64::from(*flag)),
        Value::Number(number) => {
            if let Some(int) = number.as_i64() {
                LaxInt::Int(int)
            } else if let Some(big) = number.as_u64() {
                LaxInt::OutOfRange(big.to_string())
            } else {
                match number.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 => {
                        if (-I64_BOUND..I64_BOUND).contains(&f) {
                            LaxInt::Int(f as i64)
                        } else {
                            LaxInt::OutOfRange(number.to_string())
                        }
                    }
                    _ => LaxInt::NotInteger,
                }
            }
        }
        Value::String(text) => {
            let text = text.trim();
            if let Ok(int) = text.parse::<i64>() {
                return LaxInt::Int(int);
            }
            let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                LaxInt::OutOfRange(text.to_string())
            } else {
                LaxInt::NotInteger
            }
        }
        _ => LaxInt::NotInteger,
    }
}

fn id_out_of_range(shown: &str) -> FieldProblem {
    problem(
        "id",
        &format!("must be between {NOTE_ID_MIN} and {NOTE_ID_MAX}, got {shown}"),
    )
}

fn required_string(
    value: Option<&Value>,
    field: &str,
    problems: &mut Vec<FieldProblem>,
) -> Option<String> {
    match value {
        None | Some(Value::Null) => {
            problems.push(problem(field, "field required"));
            None
        }
        Some(Value::String(text)) => Some(text.clone()),
        Some(_) => {
            problems.push(problem(field, "must be a string"));
            None
        }
    }
}

fn problem(field: &str, message: &str) -> FieldProblem {
    FieldProblem {
        field: field.to_string(),
        message: message.to_string(),
    }
}

/// Builder for a single structured note generation.
pub struct NotesBuilder {
    lab: Arc<LabInner>,
    state: LabState,
    model: String,
    temperature: Option<f32>,
    expected_count: Option<usize>,
    shape_retries: u32,
}

impl NotesBuilder {
    pub(crate) fn new(lab: Arc<LabInner>, state: LabState) -> Self {
        Self {
            lab,
            state,
            model: DEFAULT_NOTES_MODEL.to_string(),
            temperature: None,
            expected_count: None,
            shape_retries: 0,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Treats a `notes` array of any other length as a shape failure.
    ///
    /// By default the count is only logged.
    pub fn expected_count(mut self, count: usize) -> Self {
        self.expected_count = Some(count);
        self
    }

    /// Re-issues the request up to `retries` times after a shape failure.
    ///
    /// Parse and validation failures are never retried.
    pub fn shape_retries(mut self, retries: u32) -> Self {
        self.shape_retries = retries;
        self
    }

    /// Requests, parses and validates the notes.
    pub async fn generate(self) -> Result<Vec<Note>, LabError> {
        if self.model.trim().is_empty() {
            return Err(LabError::Validation("model must not be empty".into()));
        }
        if let Some(temperature) = self.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(LabError::Validation(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        let span = info_span!("notes", request_id = %uuid::Uuid::new_v4(), model = %self.model);
        self.execute().instrument(span).await
    }

    async fn execute(self) -> Result<Vec<Note>, LabError> {
        debug!(assistant_id = %self.state.assistant_id, vector_store_id = %self.state.vector_store_id, "state validated; generation does not use it");
        let request = JsonChatRequest {
            model: self.model.clone(),
            system_prompt: NOTES_SYSTEM_PROMPT.to_string(),
            temperature: self.temperature,
        };

        let mut attempt = 0_u32;
        let items = loop {
            attempt += 1;
            let raw = self.lab.backend.chat_json(&request).await?;
            debug!(attempt, bytes = raw.len(), "generation response received");
            match parse_notes_payload(&raw).and_then(|items| self.check_count(items, &raw)) {
                Ok(items) => break items,
                Err(err @ LabError::MalformedOutput { stage: OutputStage::Shape, .. })
                    if attempt <= self.shape_retries =>
                {
                    warn!(attempt, error = %err, "retrying after shape failure");
                }
                Err(err) => {
                    error!(attempt, error = %err, "generation response rejected");
                    return Err(err);
                }
            }
        };

        if items.len() != NOTE_COUNT {
            warn!(count = items.len(), expected = NOTE_COUNT, "unexpected number of notes");
        }
        let notes = validate_notes(&items).map_err(|issues| {
            error!(invalid = issues.len(), total = items.len(), "note validation failed");
            LabError::InvalidNotes(issues)
        })?;
        info!(count = notes.len(), "notes validated");
        Ok(notes)
    }

    fn check_count(&self, items: Vec<Value>, raw: &str) -> Result<Vec<Value>, LabError> {
        match self.expected_count {
            Some(expected) if items.len() != expected => Err(LabError::MalformedOutput {
                stage: OutputStage::Shape,
                message: format!("expected {expected} notes, got {}", items.len()),
                raw: raw.to_string(),
            }),
            _ => Ok(items),
        }
    }
}

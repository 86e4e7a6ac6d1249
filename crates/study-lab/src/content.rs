use crate::model::{FileId, RunId};

/// Author of a thread message.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
    #[serde(other)]
    Other,
}

/// Message sent when creating a thread.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
}

impl NewMessage {
    /// Creates a user-authored message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Message stored in a remote thread.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ThreadMessage {
    pub id: String,
    pub role: MessageRole,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

/// One content block of a thread message.
///
/// Only text blocks carry answer text; other kinds (images, refusals) are kept
/// as `Unsupported` so decoding never fails on them.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ContentBlock {
    Text { text: TextContent },
    #[serde(other)]
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextContent {
    pub value: String,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
}

/// Annotation attached to a span of answer text.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum Annotation {
    FileCitation {
        #[serde(default)]
        text: String,
        file_citation: FileCitation,
    },
    #[serde(other)]
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FileCitation {
    pub file_id: FileId,
}

impl ThreadMessage {
    /// Concatenates all text blocks in order, without separators.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if let ContentBlock::Text { text } = block {
                out.push_str(&text.value);
            }
        }
        out
    }

    /// File ids of every file citation, in block then annotation order.
    ///
    /// Repeated citations are kept.
    pub fn cited_file_ids(&self) -> Vec<FileId> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(&text.annotations),
                ContentBlock::Unsupported => None,
            })
            .flatten()
            .filter_map(|annotation| match annotation {
                Annotation::FileCitation { file_citation, .. } => {
                    Some(file_citation.file_id.clone())
                }
                Annotation::Other => None,
            })
            .collect()
    }
}

/// Source document cited by an answer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Citation {
    pub file_id: FileId,
    pub filename: String,
}

/// Final answer for a completed question run.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Answer {
    pub run_id: RunId,
    pub text: String,
    pub citations: Vec<Citation>,
}

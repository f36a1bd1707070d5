//! Task inputs handed to the orchestrator by the CRUD layer.
//!
//! One variant per task type, validated at construction so the selector never
//! has to guess at loosely-typed fields.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::Modality;

/// Hard ceiling on texts per embedding call.
pub const MAX_EMBEDDING_BATCH: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    JobParsing,
    DocumentParsing,
    CvGeneration,
    Embedding,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::JobParsing => "job_parsing",
            TaskType::DocumentParsing => "document_parsing",
            TaskType::CvGeneration => "cv_generation",
            TaskType::Embedding => "embedding",
        }
    }

    pub fn modality(&self) -> Modality {
        match self {
            TaskType::Embedding => Modality::Embedding,
            _ => Modality::Chat,
        }
    }

    pub fn all() -> [TaskType; 4] {
        [
            TaskType::JobParsing,
            TaskType::DocumentParsing,
            TaskType::CvGeneration,
            TaskType::Embedding,
        ]
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = TaskInputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskType::all()
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| TaskInputError::UnknownTaskType(s.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskInputError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),

    #[error("Embedding batch of {0} exceeds the limit of {}", MAX_EMBEDDING_BATCH)]
    BatchTooLarge(usize),

    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),
}

/// Caller preferences for CV generation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationPreferences {
    #[serde(default)]
    pub creative: bool,
    #[serde(default)]
    pub detailed: bool,
    /// BCP-47 tag of the output language, e.g. "de-DE".
    #[serde(default)]
    pub target_locale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskInput {
    JobParsing {
        job_description: String,
        #[serde(default)]
        company_name: Option<String>,
    },
    DocumentParsing {
        document_text: String,
        #[serde(default)]
        document_kind: Option<String>,
    },
    CvGeneration {
        job_description: String,
        /// Pre-rendered artifact summaries (experience, projects, ...).
        artifacts: Vec<String>,
        #[serde(default)]
        preferences: GenerationPreferences,
    },
    Embedding {
        texts: Vec<String>,
    },
}

impl TaskInput {
    pub fn job_parsing(job_description: impl Into<String>) -> Result<Self, TaskInputError> {
        Self::JobParsing {
            job_description: job_description.into(),
            company_name: None,
        }
        .validated()
    }

    pub fn document_parsing(document_text: impl Into<String>) -> Result<Self, TaskInputError> {
        Self::DocumentParsing {
            document_text: document_text.into(),
            document_kind: None,
        }
        .validated()
    }

    pub fn cv_generation(
        job_description: impl Into<String>,
        artifacts: Vec<String>,
        preferences: GenerationPreferences,
    ) -> Result<Self, TaskInputError> {
        Self::CvGeneration {
            job_description: job_description.into(),
            artifacts,
            preferences,
        }
        .validated()
    }

    pub fn embedding(texts: Vec<String>) -> Result<Self, TaskInputError> {
        Self::Embedding { texts }.validated()
    }

    /// Re-checks invariants; used for inputs that arrive through serde.
    pub fn validated(self) -> Result<Self, TaskInputError> {
        match &self {
            TaskInput::JobParsing {
                job_description, ..
            } => require_text(job_description, "job_description")?,
            TaskInput::DocumentParsing { document_text, .. } => {
                require_text(document_text, "document_text")?
            }
            TaskInput::CvGeneration {
                job_description,
                artifacts,
                ..
            } => {
                require_text(job_description, "job_description")?;
                if artifacts.iter().all(|a| a.trim().is_empty()) {
                    return Err(TaskInputError::Empty("artifacts"));
                }
            }
            TaskInput::Embedding { texts } => {
                if texts.iter().all(|t| t.trim().is_empty()) {
                    return Err(TaskInputError::Empty("texts"));
                }
                if texts.len() > MAX_EMBEDDING_BATCH {
                    return Err(TaskInputError::BatchTooLarge(texts.len()));
                }
            }
        }
        Ok(self)
    }

    pub fn task_type(&self) -> TaskType {
        match self {
            TaskInput::JobParsing { .. } => TaskType::JobParsing,
            TaskInput::DocumentParsing { .. } => TaskType::DocumentParsing,
            TaskInput::CvGeneration { .. } => TaskType::CvGeneration,
            TaskInput::Embedding { .. } => TaskType::Embedding,
        }
    }

    /// The text whose size and vocabulary drive the complexity heuristic.
    pub fn primary_text(&self) -> String {
        match self {
            TaskInput::JobParsing {
                job_description, ..
            }
            | TaskInput::CvGeneration {
                job_description, ..
            } => job_description.clone(),
            TaskInput::DocumentParsing { document_text, .. } => document_text.clone(),
            TaskInput::Embedding { texts } => texts.join("\n"),
        }
    }

    pub fn item_count(&self) -> usize {
        match self {
            TaskInput::CvGeneration { artifacts, .. } => artifacts.len(),
            TaskInput::Embedding { texts } => texts.len(),
            _ => 0,
        }
    }
}

fn require_text(value: &str, field: &'static str) -> Result<(), TaskInputError> {
    if value.trim().is_empty() {
        Err(TaskInputError::Empty(field))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_job_description_rejected() {
        assert_eq!(
            TaskInput::job_parsing("   "),
            Err(TaskInputError::Empty("job_description"))
        );
    }

    #[test]
    fn test_cv_generation_requires_artifacts() {
        let result = TaskInput::cv_generation(
            "Senior Rust engineer",
            vec![],
            GenerationPreferences::default(),
        );
        assert_eq!(result, Err(TaskInputError::Empty("artifacts")));
    }

    #[test]
    fn test_embedding_batch_limit() {
        let texts = vec!["x".to_string(); MAX_EMBEDDING_BATCH + 1];
        assert_eq!(
            TaskInput::embedding(texts),
            Err(TaskInputError::BatchTooLarge(MAX_EMBEDDING_BATCH + 1))
        );
    }

    #[test]
    fn test_tagged_deserialization() {
        let json = serde_json::json!({
            "task_type": "cv_generation",
            "job_description": "Build distributed systems in Rust",
            "artifacts": ["Led migration to Kubernetes"],
            "preferences": { "creative": true }
        });
        let input: TaskInput = serde_json::from_value(json).unwrap();
        assert_eq!(input.task_type(), TaskType::CvGeneration);
        assert_eq!(input.item_count(), 1);
        assert!(input.validated().is_ok());
    }

    #[test]
    fn test_task_type_parse() {
        assert_eq!("cv_generation".parse::<TaskType>(), Ok(TaskType::CvGeneration));
        assert!("summarize".parse::<TaskType>().is_err());
        assert_eq!(TaskType::Embedding.modality(), Modality::Embedding);
    }
}

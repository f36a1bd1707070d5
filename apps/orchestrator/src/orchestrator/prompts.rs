// Prompt fragments per task type. The CRUD layer can append its own
// instructions; everything here only frames the input.

use crate::providers::ProviderInput;
use crate::task::TaskInput;

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You are a precise, structured assistant. \
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

const JOB_PARSING_SYSTEM: &str = "Extract the structured requirements of a job posting: \
    title, company, seniority, required skills, preferred skills and responsibilities.";

const DOCUMENT_PARSING_SYSTEM: &str = "Extract the structured career history contained in a \
    document: roles, projects, skills, education and dates.";

const CV_GENERATION_SYSTEM: &str = "Write a tailored CV for the job description using only the \
    candidate artifacts provided. Do NOT invent employers, dates or achievements.";

pub fn build_input(input: &TaskInput, instructions: Option<&str>) -> ProviderInput {
    let (task_system, mut prompt) = match input {
        TaskInput::JobParsing {
            job_description,
            company_name,
        } => {
            let mut prompt = String::new();
            if let Some(company) = company_name {
                prompt.push_str(&format!("Company: {company}\n\n"));
            }
            prompt.push_str(&format!("Job posting:\n{job_description}"));
            (JOB_PARSING_SYSTEM, prompt)
        }
        TaskInput::DocumentParsing {
            document_text,
            document_kind,
        } => {
            let kind = document_kind.as_deref().unwrap_or("document");
            (
                DOCUMENT_PARSING_SYSTEM,
                format!("Document type: {kind}\n\n{document_text}"),
            )
        }
        TaskInput::CvGeneration {
            job_description,
            artifacts,
            preferences,
        } => {
            let mut prompt =
                format!("Job description:\n{job_description}\n\nCandidate artifacts:\n");
            for (i, artifact) in artifacts.iter().enumerate() {
                prompt.push_str(&format!("{}. {}\n", i + 1, artifact));
            }
            if preferences.creative {
                prompt.push_str("\nUse a distinctive, engaging voice.");
            }
            if preferences.detailed {
                prompt.push_str("\nInclude quantified detail for every role.");
            }
            if let Some(locale) = &preferences.target_locale {
                prompt.push_str(&format!("\nWrite the CV in the language of locale {locale}."));
            }
            (CV_GENERATION_SYSTEM, prompt)
        }
        TaskInput::Embedding { texts } => {
            return ProviderInput::Embedding {
                texts: texts.clone(),
            }
        }
    };

    if let Some(extra) = instructions.filter(|s| !s.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }

    ProviderInput::Chat {
        system: format!("{task_system}\n\n{JSON_ONLY_SYSTEM}"),
        prompt,
    }
}

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::form::ExtractedFields;
use crate::transcription::TranscriptionResult;

/// How a transcription result is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum IntentMode {
    /// Route the user to the spoken page
    Navigate,
    /// Fill the listing form from the spoken details
    #[value(name = "fields")]
    ExtractFields,
}

impl IntentMode {
    /// Prefix of the uploaded file name
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Self::Navigate => "routing",
            Self::ExtractFields => "recording",
        }
    }
}

/// Callbacks supplied by the host application
pub trait IntentHost: Send + Sync {
    /// Navigate to `target` (a route identifier)
    fn on_navigate(&self, target: &str);

    /// Merge the extracted fields into the host's form
    fn on_fields_extracted(&self, fields: &ExtractedFields);

    /// Informational message for the user (not a failure)
    fn on_notice(&self, _message: &str) {}
}

/// What the resolver did with a result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntentOutcome {
    Navigated { target: String },
    FieldsExtracted { fields: ExtractedFields },
    /// Soft outcome: nothing usable in the response
    NoActionableData,
}

impl IntentOutcome {
    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::NoActionableData)
    }
}

/// Result stored on a completed session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureResult {
    pub transcription: Option<String>,
    #[serde(flatten)]
    pub outcome: IntentOutcome,
}

/// Turns a transcription result into exactly one host action (or none)
#[derive(Debug, Clone, Copy)]
pub struct IntentResolver {
    mode: IntentMode,
}

impl IntentResolver {
    pub fn new(mode: IntentMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> IntentMode {
        self.mode
    }

    pub fn resolve(&self, result: &TranscriptionResult, host: &dyn IntentHost) -> CaptureResult {
        let outcome = match self.mode {
            IntentMode::Navigate => self.resolve_navigation(result, host),
            IntentMode::ExtractFields => self.resolve_fields(result, host),
        };

        CaptureResult {
            transcription: result.transcription.clone(),
            outcome,
        }
    }

    fn resolve_navigation(&self, result: &TranscriptionResult, host: &dyn IntentHost) -> IntentOutcome {
        match &result.page {
            Some(target) => {
                info!("Navigating to {}", target);
                host.on_navigate(target);
                IntentOutcome::Navigated {
                    target: target.clone(),
                }
            }
            None => {
                warn!("Transcription did not map to a page");
                host.on_notice(&with_transcript(
                    "Could not match your request to a page.",
                    result,
                ));
                IntentOutcome::NoActionableData
            }
        }
    }

    fn resolve_fields(&self, result: &TranscriptionResult, host: &dyn IntentHost) -> IntentOutcome {
        let fields = &result.fields;

        if fields.is_empty() {
            warn!("No listing fields found in transcription");
            host.on_notice(&with_transcript("No crop information detected.", result));
            return IntentOutcome::NoActionableData;
        }

        info!("Extracted {} listing fields", fields.present_count());
        host.on_fields_extracted(fields);
        host.on_notice(&with_transcript(
            &format!(
                "Form auto-filled with: {}",
                fields.name.as_deref().unwrap_or("No crop detected")
            ),
            result,
        ));

        IntentOutcome::FieldsExtracted {
            fields: fields.clone(),
        }
    }
}

fn with_transcript(message: &str, result: &TranscriptionResult) -> String {
    match result.transcription.as_deref().filter(|t| !t.is_empty()) {
        Some(text) => format!("Transcription: {text}\n{message}"),
        None => message.to_string(),
    }
}

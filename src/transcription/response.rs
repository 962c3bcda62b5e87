//! Transcription service response shape.
//!
//! ```text
//! { transcription?, page?, crop_data?: { crop_name?, crop_unit?, price_per_unit?, quantity? } }
//! ```
//!
//! Crop fields are also accepted inlined at the top level when `crop_data` is
//! absent, for compatibility with older service versions.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CaptureError;
use crate::intent::ExtractedFields;

/// Validated result handed to the intent resolver
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub transcription: Option<String>,
    /// Navigation target
    pub page: Option<String>,
    /// Listing fields
    pub fields: ExtractedFields,
}

#[derive(Debug, Default, Deserialize)]
struct CropData {
    #[serde(default)]
    crop_name: Option<String>,
    #[serde(default)]
    crop_unit: Option<String>,
    #[serde(default, deserialize_with = "lenient_number")]
    price_per_unit: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    quantity: Option<f64>,
}

impl From<CropData> for ExtractedFields {
    fn from(crop: CropData) -> Self {
        ExtractedFields {
            name: crop.crop_name,
            price: crop.price_per_unit,
            unit: crop.crop_unit,
            quantity: crop.quantity,
        }
        .normalized()
    }
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    transcription: Option<String>,
    #[serde(default)]
    page: Option<String>,
    #[serde(default)]
    crop_data: Option<CropData>,
    #[serde(flatten)]
    inline: CropData,
}

/// Numbers may arrive as JSON numbers or numeric strings; blank strings are absent
fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(f64),
        Text(String),
    }

    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::Text(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                trimmed
                    .parse::<f64>()
                    .map(Some)
                    .map_err(serde::de::Error::custom)
            }
        }
    }
}

/// Parse and validate a 2xx response body
pub fn parse_response(body: &str) -> Result<TranscriptionResult, CaptureError> {
    if body.trim().is_empty() {
        return Err(CaptureError::MalformedResponse("empty response body".into()));
    }

    let value: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| CaptureError::MalformedResponse(format!("invalid JSON: {e}")))?;

    if !value.is_object() {
        return Err(CaptureError::MalformedResponse(
            "expected a JSON object".into(),
        ));
    }

    let raw: RawResponse = serde_json::from_value(value)
        .map_err(|e| CaptureError::MalformedResponse(e.to_string()))?;

    let fields = match raw.crop_data {
        Some(nested) => ExtractedFields::from(nested),
        None => ExtractedFields::from(raw.inline),
    };

    Ok(TranscriptionResult {
        transcription: raw.transcription,
        page: raw.page.map(|p| p.trim().to_string()).filter(|p| !p.is_empty()),
        fields,
    })
}

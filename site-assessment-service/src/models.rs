use serde::{Deserialize, Serialize};

/// A single file received from the upload form. Lives only for the duration of
/// one request.
#[derive(Debug, Clone)]
pub struct UploadedAsset {
    pub content: Vec<u8>,
    pub declared_mime_type: String,
    pub original_name: String,
    pub size_bytes: usize,
}

impl UploadedAsset {
    pub fn new(
        original_name: impl Into<String>,
        declared_mime_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        let size_bytes = content.len();
        Self {
            content,
            declared_mime_type: declared_mime_type.into(),
            original_name: original_name.into(),
            size_bytes,
        }
    }
}

/// Free-text details about the assessed site, supplied by the on-site assessor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentContext {
    pub site_name: Option<String>,
    pub facility_type: Option<String>,
    pub location_environment: Option<String>,
    pub initial_observations: Option<String>,
    pub specific_concerns: Option<String>,
}

impl AssessmentContext {
    /// Stores a form field by its wire name. Returns false for names that are not
    /// context fields.
    pub fn set_field(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "siteName" => &mut self.site_name,
            "facilityType" => &mut self.facility_type,
            "locationEnvironment" => &mut self.location_environment,
            "initialObservations" => &mut self.initial_observations,
            "specificConcerns" => &mut self.specific_concerns,
            _ => return false,
        };
        // Blank inputs are treated the same as missing ones
        *slot = if value.trim().is_empty() {
            None
        } else {
            Some(value)
        };
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisResult {
    pub markdown_text: String,
    pub source_filenames: Vec<String>,
}

/// Success body of `POST /api/assess`.
#[derive(Debug, Serialize, Deserialize)]
pub struct AssessResponse {
    pub analysis: String,
    pub filenames: Vec<String>,
}

impl From<AnalysisResult> for AssessResponse {
    fn from(result: AnalysisResult) -> Self {
        Self {
            analysis: result.markdown_text,
            filenames: result.source_filenames,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

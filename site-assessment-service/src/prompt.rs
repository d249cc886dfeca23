use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::models::{AssessmentContext, UploadedAsset};

/// Section titles every generated report must contain.
pub const REQUIRED_SECTIONS: [&str; 4] = [
    "Executive Summary",
    "Identified Vulnerabilities",
    "Positive Security Features",
    "Concluding Remarks",
];

const NOT_PROVIDED: &str = "Not Provided";
const NONE_GIVEN: &str = "None";

/// One element of a multimodal chat message, in chat-completions wire format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Ordered content for a single user message: the instruction text followed by one
/// image per upload, in upload order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnalysisRequest {
    parts: Vec<ContentPart>,
}

impl AnalysisRequest {
    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    pub fn text(&self) -> Option<&str> {
        self.parts.iter().find_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn image_urls(&self) -> impl Iterator<Item = &str> {
        self.parts.iter().filter_map(|part| match part {
            ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
            _ => None,
        })
    }
}

pub fn to_data_uri(asset: &UploadedAsset) -> String {
    format!(
        "data:{};base64,{}",
        asset.declared_mime_type,
        STANDARD.encode(&asset.content)
    )
}

pub fn build_analysis_request(
    context: &AssessmentContext,
    assets: &[UploadedAsset],
) -> AnalysisRequest {
    let mut parts = Vec::with_capacity(assets.len() + 1);
    parts.push(ContentPart::Text {
        text: render_instructions(context),
    });
    parts.extend(assets.iter().map(|asset| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: to_data_uri(asset),
        },
    }));

    AnalysisRequest { parts }
}

fn or_placeholder<'a>(value: &'a Option<String>, placeholder: &'a str) -> &'a str {
    value.as_deref().unwrap_or(placeholder)
}

fn render_instructions(context: &AssessmentContext) -> String {
    format!(
        "You are a world-class physical security consultant with 20 years of experience creating security assessment reports and Standard Operating Procedures (SOPs) for major corporations.

You are analyzing the following location:
- Site Name: {site_name}
- Facility Type: {facility_type}
- Environment: {environment}

The on-site human assessor has provided the following notes:
- Initial Observations: {observations}
- Specific Concerns: {concerns}

The following images have been provided as visual evidence, numbered in the order they appear (Image 1, Image 2, ...). Analyze them carefully in conjunction with the assessor's notes to identify vulnerabilities and positive security features.

YOUR TASK:
Generate a comprehensive physical security audit report in Markdown format. The report MUST include the following sections:
1. **{summary}:** A brief overview of the security posture, summarizing key findings.
2. **{vulnerabilities}:** A numbered list of all identified risks. For each risk, you must provide:
   * **Vulnerability:** A clear, concise description of the issue (e.g., \"Unsecured Perimeter Fence\").
   * **Observed in Image(s):** Reference which uploaded image(s) (e.g., \"Image 1\", \"Image 3\") show this vulnerability.
   * **Severity:** A rating of Low, Medium, or High, with justification.
   * **Recommendation/SOP:** A detailed, actionable Standard Operating Procedure (SOP) to mitigate the risk. This should be practical and specific.
3. **{positives}:** A numbered list of security measures that are correctly implemented or observed as beneficial. For each feature, reference which uploaded image(s) (e.g., \"Image 2\") show this feature.
4. **{remarks}:** A brief summary and any final recommendations.",
        site_name = or_placeholder(&context.site_name, NOT_PROVIDED),
        facility_type = or_placeholder(&context.facility_type, NOT_PROVIDED),
        environment = or_placeholder(&context.location_environment, NOT_PROVIDED),
        observations = or_placeholder(&context.initial_observations, NONE_GIVEN),
        concerns = or_placeholder(&context.specific_concerns, NONE_GIVEN),
        summary = REQUIRED_SECTIONS[0],
        vulnerabilities = REQUIRED_SECTIONS[1],
        positives = REQUIRED_SECTIONS[2],
        remarks = REQUIRED_SECTIONS[3],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn image_parts_follow_upload_order() {
        let assets = vec![
            UploadedAsset::new("a.jpg", "image/jpeg", b"A".to_vec()),
            UploadedAsset::new("b.png", "image/png", b"B".to_vec()),
            UploadedAsset::new("c.glb", "model/gltf-binary", b"C".to_vec()),
        ];

        let request = build_analysis_request(&AssessmentContext::default(), &assets);

        assert_eq!(request.parts().len(), 4);
        assert!(matches!(request.parts()[0], ContentPart::Text { .. }));
        let urls: Vec<_> = request.image_urls().collect();
        assert_eq!(
            urls,
            vec![
                "data:image/jpeg;base64,QQ==",
                "data:image/png;base64,Qg==",
                "data:model/gltf-binary;base64,Qw==",
            ]
        );
    }

    #[test]
    fn missing_context_uses_placeholders() {
        let context = AssessmentContext {
            site_name: Some("Warehouse A".to_string()),
            ..Default::default()
        };

        let request = build_analysis_request(&context, &[]);
        let text = request.text().unwrap();

        assert!(text.contains("- Site Name: Warehouse A"));
        assert!(text.contains("- Facility Type: Not Provided"));
        assert!(text.contains("- Environment: Not Provided"));
        assert!(text.contains("- Initial Observations: None"));
        assert!(text.contains("- Specific Concerns: None"));
    }

    #[test]
    fn context_is_embedded_verbatim() {
        let context = AssessmentContext {
            initial_observations: Some("Gate left *open* at 02:00".to_string()),
            ..Default::default()
        };

        let text = build_analysis_request(&context, &[]).text().unwrap().to_string();
        assert!(text.contains("- Initial Observations: Gate left *open* at 02:00"));
    }

    #[test]
    fn instructions_name_every_required_section() {
        let request = build_analysis_request(&AssessmentContext::default(), &[]);
        let text = request.text().unwrap();
        for section in REQUIRED_SECTIONS {
            assert!(text.contains(&format!("**{section}:**")), "missing {section}");
        }
        assert!(text.contains("Observed in Image(s)"));
        assert!(text.contains("Severity"));
    }

    #[test]
    fn serializes_as_chat_content_parts() {
        let assets = vec![UploadedAsset::new("a.jpg", "image/jpeg", b"A".to_vec())];
        let request = build_analysis_request(&AssessmentContext::default(), &assets);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value[0]["type"], "text");
        assert_eq!(
            value[1],
            json!({
                "type": "image_url",
                "image_url": { "url": "data:image/jpeg;base64,QQ==" }
            })
        );
    }

    #[test]
    fn building_is_deterministic() {
        let assets = vec![UploadedAsset::new("a.jpg", "image/jpeg", vec![1, 2, 3])];
        let context = AssessmentContext::default();
        assert_eq!(
            build_analysis_request(&context, &assets),
            build_analysis_request(&context, &assets)
        );
    }
}

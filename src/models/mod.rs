use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input to a single brew analysis (the `analyzeBrew` query arguments)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub photo_key: String,
    pub brew_method: String,
}

impl AnalysisRequest {
    pub fn new(photo_key: impl Into<String>, brew_method: impl Into<String>) -> Self {
        Self {
            photo_key: photo_key.into(),
            brew_method: brew_method.into(),
        }
    }
}

/// Image media types accepted by the model backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Png,
    Jpeg,
}

impl MediaType {
    /// Guess the media type from a storage key.
    ///
    /// This only looks at the suffix, never at the bytes: a case-insensitive
    /// `.png` ending means PNG, anything else (including no extension) is
    /// treated as JPEG.
    pub fn from_key(key: &str) -> Self {
        if key.to_ascii_lowercase().ends_with(".png") {
            MediaType::Png
        } else {
            MediaType::Jpeg
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Png => "image/png",
            MediaType::Jpeg => "image/jpeg",
        }
    }

    /// Short format name used by Bedrock (`"png"` / `"jpeg"`)
    pub fn format(&self) -> &'static str {
        match self {
            MediaType::Png => "png",
            MediaType::Jpeg => "jpeg",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mime())
    }
}

/// Fully materialized image bytes, alive for one request only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
}

impl RawImage {
    pub fn new(bytes: Vec<u8>, media_type: MediaType) -> Self {
        Self { bytes, media_type }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualFeedback {
    pub color_analysis: String,
    pub pattern_analysis: String,
    pub texture_notes: String,
}

/// Validated outcome of a brew analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub extraction_score: f64,
    pub visual_feedback: VisualFeedback,
    pub channeling: bool,
    pub over_extraction: bool,
    pub ai_suggestions: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AnalysisStatus::Pending => "pending",
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

impl AnalysisStatus {
    pub fn from_string(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Some(AnalysisStatus::Pending),
            "analyzing" => Some(AnalysisStatus::Analyzing),
            "completed" => Some(AnalysisStatus::Completed),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

/// A persisted brew record with its (optional) analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrewLog {
    pub id: i64,
    pub photo_key: String,
    pub brew_method: Option<String>,
    pub coffee_bean: Option<String>,
    pub grind_size: Option<String>,
    pub water_temp: Option<f64>,
    pub brew_time: Option<i32>, // seconds
    pub notes: Option<String>,
    pub analysis_status: AnalysisStatus,
    pub extraction_score: Option<f64>,
    pub visual_feedback: Option<VisualFeedback>,
    pub channeling: Option<bool>,
    pub over_extraction: Option<bool>,
    pub ai_suggestions: Option<String>,
    pub analysis_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for creating a brew record after the photo has been uploaded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBrewLog {
    pub photo_key: String,
    #[serde(default)]
    pub brew_method: Option<String>,
    #[serde(default)]
    pub coffee_bean: Option<String>,
    #[serde(default)]
    pub grind_size: Option<String>,
    #[serde(default)]
    pub water_temp: Option<f64>,
    #[serde(default)]
    pub brew_time: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_png_is_case_insensitive() {
        assert_eq!(MediaType::from_key("brew-photos/123-shot.PNG"), MediaType::Png);
        assert_eq!(MediaType::from_key("brew-photos/123-shot.png"), MediaType::Png);
        assert_eq!(MediaType::from_key("brew-photos/123-shot.Png"), MediaType::Png);
    }

    #[test]
    fn test_media_type_defaults_to_jpeg() {
        assert_eq!(MediaType::from_key("brew-photos/123-shot.jpg"), MediaType::Jpeg);
        assert_eq!(MediaType::from_key("brew-photos/123-shot"), MediaType::Jpeg);
        assert_eq!(MediaType::from_key("brew-photos/123-shot.webp"), MediaType::Jpeg);
        assert_eq!(MediaType::from_key("brew-photos/png"), MediaType::Jpeg);
        assert_eq!(MediaType::Jpeg.mime(), "image/jpeg");
        assert_eq!(MediaType::Png.format(), "png");
    }

    #[test]
    fn test_analysis_result_wire_format() {
        let result = AnalysisResult {
            extraction_score: 82.0,
            visual_feedback: VisualFeedback {
                color_analysis: "even".to_string(),
                pattern_analysis: "none".to_string(),
                texture_notes: "smooth".to_string(),
            },
            channeling: false,
            over_extraction: false,
            ai_suggestions: "grind finer".to_string(),
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["extractionScore"], 82.0);
        assert_eq!(json["visualFeedback"]["textureNotes"], "smooth");
        assert_eq!(json["overExtraction"], false);
        assert_eq!(json["aiSuggestions"], "grind finer");
    }

    #[test]
    fn test_analysis_request_deserialization() {
        let json = r#"{"photoKey": "brew-photos/1-a.jpg", "brewMethod": "espresso"}"#;
        let request: AnalysisRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request, AnalysisRequest::new("brew-photos/1-a.jpg", "espresso"));
    }

    #[test]
    fn test_analysis_status_round_trip_names() {
        assert_eq!(AnalysisStatus::from_string("Completed"), Some(AnalysisStatus::Completed));
        assert_eq!(AnalysisStatus::from_string("unknown"), None);
        assert_eq!(AnalysisStatus::Analyzing.to_string(), "analyzing");
    }

    #[test]
    fn test_new_brew_log_optional_fields() {
        let json = r#"{"photoKey": "brew-photos/2-b.png", "brewMethod": "pour-over", "waterTemp": 93.5}"#;
        let new_log: NewBrewLog = serde_json::from_str(json).unwrap();

        assert_eq!(new_log.photo_key, "brew-photos/2-b.png");
        assert_eq!(new_log.water_temp, Some(93.5));
        assert!(new_log.notes.is_none());
    }
}

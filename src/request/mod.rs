use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Sent in place of a structured response when the user dismisses the
/// popup without answering.
pub const CANCELLED_SENTINEL: &str = "CANCELLED";

const RESPONSE_SOURCE: &str = "popup";

pub type RequestResult<T> = std::result::Result<T, RequestError>;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request payload is not valid: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("request payload has an empty id")]
    MissingId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequest {
    pub id: String,
    pub message: String,
    #[serde(default, alias = "predefinedOptions")]
    pub predefined_options: Option<Vec<String>>,
    #[serde(default, alias = "isMarkdown")]
    pub is_markdown: bool,
}

impl ReviewRequest {
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            predefined_options: None,
            is_markdown: false,
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.predefined_options = Some(options.into_iter().map(Into::into).collect());
        self
    }

    pub fn markdown(mut self) -> Self {
        self.is_markdown = true;
        self
    }

    pub fn options(&self) -> &[String] {
        self.predefined_options.as_deref().unwrap_or_default()
    }
}

/// Parse a request handed over by the host, either a launch file's contents
/// or an event payload.
pub fn parse_request(payload: Value) -> RequestResult<ReviewRequest> {
    let request: ReviewRequest = serde_json::from_value(payload)?;
    if request.id.trim().is_empty() {
        return Err(RequestError::MissingId);
    }
    Ok(request)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAttachment {
    /// Base64-encoded image bytes.
    pub data: String,
    pub media_type: String,
    #[serde(default)]
    pub filename: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub timestamp: Option<String>,
    pub request_id: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewResponse {
    pub user_input: Option<String>,
    pub selected_options: Vec<String>,
    pub images: Vec<ImageAttachment>,
    pub metadata: ResponseMetadata,
}

impl ReviewResponse {
    /// Empty answer stamped with the request id and the current time.
    pub fn answer(request: &ReviewRequest) -> Self {
        Self {
            metadata: ResponseMetadata {
                timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
                request_id: Some(request.id.clone()),
                source: Some(RESPONSE_SOURCE.to_string()),
            },
            ..Self::default()
        }
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        let input = input.into();
        self.user_input = (!input.trim().is_empty()).then_some(input);
        self
    }

    pub fn with_selected<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.selected_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_image(mut self, image: ImageAttachment) -> Self {
        self.images.push(image);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.user_input.is_none() && self.selected_options.is_empty() && self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_request_accepts_snake_and_camel_case() {
        let snake = parse_request(json!({
            "id": "r1",
            "message": "Pick one",
            "predefined_options": ["A", "B"],
            "is_markdown": true
        }))
        .expect("snake case should parse");
        let camel = parse_request(json!({
            "id": "r1",
            "message": "Pick one",
            "predefinedOptions": ["A", "B"],
            "isMarkdown": true
        }))
        .expect("camel case should parse");

        assert_eq!(snake, camel);
        assert_eq!(snake.options(), ["A", "B"]);
        assert!(snake.is_markdown);
    }

    #[test]
    fn parse_request_defaults_optional_fields() {
        let request = parse_request(json!({ "id": "r2", "message": "hello" }))
            .expect("minimal request should parse");
        assert_eq!(request.predefined_options, None);
        assert!(!request.is_markdown);
        assert!(request.options().is_empty());
    }

    #[test]
    fn parse_request_rejects_missing_fields_and_blank_id() {
        assert!(matches!(
            parse_request(json!({ "message": "no id" })),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            parse_request(json!("just a string")),
            Err(RequestError::Malformed(_))
        ));
        assert!(matches!(
            parse_request(json!({ "id": "  ", "message": "blank" })),
            Err(RequestError::MissingId)
        ));
    }

    #[test]
    fn answer_is_stamped_with_request_metadata() {
        let request = ReviewRequest::new("r3", "question");
        let response = ReviewResponse::answer(&request)
            .with_input("looks good")
            .with_selected(["A"]);

        assert_eq!(response.metadata.request_id.as_deref(), Some("r3"));
        assert_eq!(response.metadata.source.as_deref(), Some("popup"));
        assert!(response.metadata.timestamp.is_some());
        assert_eq!(response.user_input.as_deref(), Some("looks good"));
        assert_eq!(response.selected_options, vec!["A".to_string()]);
        assert!(!response.is_empty());
    }

    #[test]
    fn blank_input_is_treated_as_absent() {
        let response = ReviewResponse::default().with_input("   ");
        assert_eq!(response.user_input, None);
        assert!(response.is_empty());
    }
}

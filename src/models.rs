use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppError;

/// Required fields, in the order they are checked.
pub const REQUIRED_FIELDS: [&str; 3] = ["product_name", "features", "keywords"];
pub const OPTIONAL_FIELDS: [&str; 4] = ["tone", "target_audience", "writing_style", "length"];

pub const DEFAULT_TONE: &str = "professional";
pub const DEFAULT_TARGET_AUDIENCE: &str = "general consumers";
pub const DEFAULT_WRITING_STYLE: &str = "descriptive";
pub const DEFAULT_LENGTH: &str = "medium";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GenerationRequest {
    pub product_name: String,
    pub features: String,
    pub keywords: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub target_audience: Option<String>,
    #[serde(default)]
    pub writing_style: Option<String>,
    // free text; short/medium/long are hints, not enforced
    #[serde(default)]
    pub length: Option<String>,
}

impl GenerationRequest {
    /// Validates a raw request body. Fails before anything is sent upstream.
    pub fn from_json(body: &[u8]) -> Result<Self, AppError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(AppError::InvalidRequest("No data provided".into()));
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidRequest(format!("Request body is not valid JSON: {}", e)))?;

        let mut object = match value {
            Value::Object(map) if !map.is_empty() => map,
            Value::Object(_) | Value::Null => return Err(AppError::InvalidRequest("No data provided".into())),
            _ => return Err(AppError::InvalidRequest("Request body must be a JSON object".into())),
        };

        for field in REQUIRED_FIELDS {
            if is_blank(object.get(field)) {
                return Err(AppError::MissingField(field));
            }
        }
        drop_blank_optionals(&mut object);

        serde_json::from_value(Value::Object(object))
            .map_err(|e| AppError::InvalidRequest(format!("Invalid field value: {}", e)))
    }

    pub fn tone(&self) -> &str {
        self.tone.as_deref().unwrap_or(DEFAULT_TONE)
    }

    pub fn target_audience(&self) -> &str {
        self.target_audience.as_deref().unwrap_or(DEFAULT_TARGET_AUDIENCE)
    }

    pub fn writing_style(&self) -> &str {
        self.writing_style.as_deref().unwrap_or(DEFAULT_WRITING_STYLE)
    }

    pub fn length(&self) -> &str {
        self.length.as_deref().unwrap_or(DEFAULT_LENGTH)
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn drop_blank_optionals(object: &mut Map<String, Value>) {
    for field in OPTIONAL_FIELDS {
        if is_blank(object.get(field)) {
            object.remove(field);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResponse {
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(body: &str) -> Result<GenerationRequest, AppError> {
        GenerationRequest::from_json(body.as_bytes())
    }

    #[test]
    fn full_request_parses() {
        let req = parse(
            r#"{"product_name":"Kettle","features":"1.7L, auto-off","keywords":"kitchen",
                "tone":"playful","target_audience":"students","writing_style":"punchy","length":"short"}"#,
        )
        .unwrap();
        assert_eq!(req.product_name, "Kettle");
        assert_eq!(req.tone(), "playful");
        assert_eq!(req.target_audience(), "students");
        assert_eq!(req.writing_style(), "punchy");
        assert_eq!(req.length(), "short");
    }

    #[test]
    fn omitted_optionals_take_defaults() {
        let req = parse(r#"{"product_name":"Kettle","features":"f","keywords":"k"}"#).unwrap();
        assert_eq!(req.tone(), "professional");
        assert_eq!(req.target_audience(), "general consumers");
        assert_eq!(req.writing_style(), "descriptive");
        assert_eq!(req.length(), "medium");
    }

    #[test]
    fn empty_or_null_optionals_take_defaults() {
        let req = parse(r#"{"product_name":"Kettle","features":"f","keywords":"k","tone":"","length":null}"#).unwrap();
        assert_eq!(req.tone(), "professional");
        assert_eq!(req.length(), "medium");
    }

    #[test]
    fn each_missing_field_is_named() {
        let cases = [
            (r#"{"features":"f","keywords":"k"}"#, "product_name"),
            (r#"{"product_name":"p","keywords":"k"}"#, "features"),
            (r#"{"product_name":"p","features":"f"}"#, "keywords"),
            (r#"{"product_name":"p","features":"","keywords":"k"}"#, "features"),
            (r#"{"product_name":"p","features":"f","keywords":null}"#, "keywords"),
        ];
        for (body, expected) in cases {
            match parse(body) {
                Err(AppError::MissingField(field)) => assert_eq!(field, expected, "body: {}", body),
                other => panic!("expected MissingField for {}, got {:?}", body, other),
            }
        }
    }

    #[test]
    fn first_missing_field_wins() {
        assert!(matches!(parse(r#"{"tone":"calm"}"#), Err(AppError::MissingField("product_name"))));
        assert!(matches!(parse(r#"{"product_name":"p"}"#), Err(AppError::MissingField("features"))));
    }

    #[test]
    fn empty_and_malformed_bodies_are_invalid() {
        for body in ["", "   ", "{}", "null", "{not json", "[1,2]", "\"text\""] {
            assert!(matches!(parse(body), Err(AppError::InvalidRequest(_))), "body: {:?}", body);
        }
    }

    #[test]
    fn non_string_values_are_invalid() {
        assert!(matches!(
            parse(r#"{"product_name":42,"features":"f","keywords":"k"}"#),
            Err(AppError::InvalidRequest(_))
        ));
        assert!(matches!(
            parse(r#"{"product_name":"p","features":"f","keywords":"k","tone":7}"#),
            Err(AppError::InvalidRequest(_))
        ));
    }
}

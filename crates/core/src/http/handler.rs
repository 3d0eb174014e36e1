use std::collections::BTreeMap;
use std::fmt::Display;

use serde_json::{json, Value};

use crate::http::message::{
    HttpRequest, HttpResponse, ALLOW_HEADERS, ALLOW_METHODS, ALLOW_ORIGIN, CONTENT_TYPE, MAX_AGE,
};
use crate::pipeline::detect_expressions_use_case::DetectExpressionsUseCase;

pub const ALLOWED_METHODS: &[&str] = &["POST", "OPTIONS"];

/// Seconds a browser may cache the preflight answer.
const PREFLIGHT_MAX_AGE: &str = "86400";

/// Request handler for the face detection endpoint.
///
/// `OPTIONS` answers the CORS preflight, `POST` runs detection on the JSON
/// body's `image` field, anything else is 405. Method names are matched
/// case-sensitively.
pub struct FaceDetectionHandler<'a> {
    use_case: DetectExpressionsUseCase<'a>,
}

impl<'a> FaceDetectionHandler<'a> {
    pub fn new(use_case: DetectExpressionsUseCase<'a>) -> Self {
        Self { use_case }
    }

    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        let response = match request.method.as_str() {
            "OPTIONS" => preflight(),
            "POST" => self.handle_post(request.body.as_deref()),
            _ => json_response(405, &json!({"error": "Method not allowed"})),
        };
        log::info!("{} -> {}", request.method, response.status_code);
        response
    }

    fn handle_post(&self, body: Option<&str>) -> HttpResponse {
        let Some(body) = body else {
            return internal_error("request has no body");
        };
        let parsed: Value = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => return internal_error(e),
        };
        let Some(fields) = parsed.as_object() else {
            return internal_error("request body must be a JSON object");
        };

        let result = match fields.get("image") {
            Some(Value::String(image)) if !image.is_empty() => self.use_case.execute(image),
            Some(other) if is_truthy(other) => {
                self.use_case.reject("image must be a base64 string")
            }
            _ => return json_response(400, &json!({"error": "No image data provided"})),
        };

        match serde_json::to_value(&result) {
            Ok(value) => json_response(200, &value),
            Err(e) => internal_error(e),
        }
    }
}

/// JSON truthiness: null, false, zero and empty strings/arrays/objects are
/// falsy.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn preflight() -> HttpResponse {
    let headers = BTreeMap::from([
        (ALLOW_ORIGIN.to_string(), "*".to_string()),
        (ALLOW_METHODS.to_string(), ALLOWED_METHODS.join(", ")),
        (ALLOW_HEADERS.to_string(), CONTENT_TYPE.to_string()),
        (MAX_AGE.to_string(), PREFLIGHT_MAX_AGE.to_string()),
    ]);
    HttpResponse {
        status_code: 200,
        headers,
        body: String::new(),
    }
}

fn json_response(status_code: u16, body: &Value) -> HttpResponse {
    let headers = BTreeMap::from([
        (ALLOW_ORIGIN.to_string(), "*".to_string()),
        (CONTENT_TYPE.to_string(), "application/json".to_string()),
    ]);
    HttpResponse {
        status_code,
        headers,
        body: body.to_string(),
    }
}

fn internal_error(reason: impl Display) -> HttpResponse {
    log::error!("Request failed: {reason}");
    json_response(
        500,
        &json!({"error": format!("Internal server error: {reason}"), "success": false}),
    )
}

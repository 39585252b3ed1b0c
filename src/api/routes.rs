use serde_json::{json, Value};

use crate::api::http::{HttpRequest, HttpResponse};
use crate::category::CategoryResolver;
use crate::detect::{best_detection, decode_image, DetectionResult, SharedBackend};

/// Everything a request handler needs. Cloned into the server thread.
#[derive(Clone)]
pub struct ServiceState {
    pub resolver: CategoryResolver,
    pub backend: Option<SharedBackend>,
    pub detect_confidence: f32,
    pub multi_confidence: f32,
}

pub fn route(state: &ServiceState, request: &HttpRequest) -> HttpResponse {
    let method = request.method.as_str();
    if method == "OPTIONS" {
        return HttpResponse::no_content();
    }
    match (method, request.path.as_str()) {
        ("GET", "/health") => health(state),
        ("POST", "/detect") => detect(state, request),
        ("POST", "/detect-multiple") => detect_multiple(state, request),
        ("GET", "/classes") => classes(state),
        (_, "/health" | "/detect" | "/detect-multiple" | "/classes") => {
            failure(405, "Method not allowed")
        }
        _ => failure(404, "Not found"),
    }
}

fn failure(status: u16, message: &str) -> HttpResponse {
    HttpResponse::json(status, json!({ "success": false, "message": message }))
}

fn health(state: &ServiceState) -> HttpResponse {
    HttpResponse::json(
        200,
        json!({ "status": "healthy", "model_loaded": state.backend.is_some() }),
    )
}

fn classes(state: &ServiceState) -> HttpResponse {
    if state.backend.is_none() {
        return failure(500, "Model not loaded");
    }
    HttpResponse::json(
        200,
        json!({ "success": true, "classes": state.resolver.table().labels() }),
    )
}

/// Shared front half of both detect routes.
fn run_detection(
    state: &ServiceState,
    request: &HttpRequest,
    min_confidence: f32,
) -> Result<Vec<DetectionResult>, HttpResponse> {
    let Some(bytes) = request.image_payload() else {
        return Err(failure(400, "No image provided"));
    };
    let Some(backend) = &state.backend else {
        return Err(failure(500, "Model not loaded"));
    };
    let result = decode_image(bytes).and_then(|image| {
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow::anyhow!("backend lock poisoned"))?;
        guard.detect(&image, min_confidence)
    });
    result.map_err(|err| {
        log::warn!("detection failed: {:#}", err);
        failure(500, &format!("Detection error: {:#}", err))
    })
}

fn detect(state: &ServiceState, request: &HttpRequest) -> HttpResponse {
    let detections = match run_detection(state, request, state.detect_confidence) {
        Ok(detections) => detections,
        Err(response) => return response,
    };
    let Some(best) = best_detection(&detections) else {
        return failure(400, "No waste detected in image");
    };
    let entry = state.resolver.resolve(&best.label);
    log::info!(
        "detected '{}' ({:.2}) -> {}",
        best.label,
        best.confidence,
        entry.category
    );
    let output = entry.output();
    HttpResponse::json(
        200,
        json!({
            "success": true,
            "result": {
                "wasteType": title_case(&best.label),
                "category": output.category,
                "confidence": percent(best.confidence),
                "recommendation": output.recommendation,
            }
        }),
    )
}

fn detect_multiple(state: &ServiceState, request: &HttpRequest) -> HttpResponse {
    let detections = match run_detection(state, request, state.multi_confidence) {
        Ok(detections) => detections,
        Err(response) => return response,
    };
    let items: Vec<Value> = detections
        .iter()
        .map(|det| {
            let output = state.resolver.resolve(&det.label).output();
            let bbox = det.bounding_box.unwrap_or(crate::detect::BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 0.0,
                height: 0.0,
            });
            json!({
                "label": title_case(&det.label),
                "confidence": det.confidence,
                "x": bbox.x,
                "y": bbox.y,
                "width": bbox.width,
                "height": bbox.height,
                "category": output.category,
                "recommendation": output.recommendation,
            })
        })
        .collect();
    HttpResponse::json(
        200,
        json!({ "success": true, "count": items.len(), "detections": items }),
    )
}

/// Confidence as a percentage rounded to two decimals.
fn percent(confidence: f32) -> f64 {
    (f64::from(confidence) * 10_000.0).round() / 100.0
}

/// Upper-case the first letter of every run of letters, lower-case the rest.
pub fn title_case(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut in_word = false;
    for c in label.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

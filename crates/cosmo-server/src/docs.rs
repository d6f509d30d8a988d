//! OpenAPI description of the HTTP surface, served at `/api-docs.json` and
//! as a download at `/api-docs.yaml`.

use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::{json, Value};

pub fn openapi_document() -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "CosmoChat relay",
            "version": env!("CARGO_PKG_VERSION"),
            "description": "Interplanetary chat relay between the Earth and Mars nodes."
        },
        "paths": {
            "/receive": {
                "post": {
                    "summary": "Deliver a message from the transport layer to both nodes",
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": { "$ref": "#/components/schemas/ReceiveRequest" }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Message broadcast to Earth and Mars",
                            "content": {
                                "application/json": {
                                    "schema": { "$ref": "#/components/schemas/StatusResponse" }
                                }
                            }
                        },
                        "400": { "description": "Invalid message format" },
                        "500": { "description": "Internal server error" }
                    }
                }
            },
            "/health": {
                "get": {
                    "summary": "Liveness and connection counts",
                    "responses": { "200": { "description": "Relay is running" } }
                }
            },
            "/metrics": {
                "get": {
                    "summary": "Prometheus metrics",
                    "responses": { "200": { "description": "Text exposition format" } }
                }
            }
        },
        "components": {
            "schemas": {
                "ReceiveRequest": {
                    "type": "object",
                    "required": ["username", "sendTime", "message"],
                    "properties": {
                        "username": { "type": "string" },
                        "sendTime": { "type": "string", "format": "date-time" },
                        "message": { "type": "string" },
                        "error": { "type": "string" }
                    }
                },
                "StatusResponse": {
                    "type": "object",
                    "properties": {
                        "status": { "type": "string", "enum": ["success", "error"] },
                        "message": { "type": "string" }
                    }
                },
                "Envelope": {
                    "type": "object",
                    "description": "WebSocket frame exchanged with the Earth and Mars nodes",
                    "required": ["event", "username", "id"],
                    "properties": {
                        "event": { "type": "string", "enum": ["connection", "message"] },
                        "username": { "type": "string" },
                        "message": { "type": "string" },
                        "id": { "type": "integer", "format": "int64", "description": "Send time in ms since the Unix epoch" },
                        "planet": { "type": "string", "enum": ["Earth", "Mars"] },
                        "error": { "type": "string" }
                    }
                }
            }
        }
    })
}

/// `GET /api-docs.json`
pub async fn api_docs() -> Json<Value> {
    Json(openapi_document())
}

/// `GET /api-docs.yaml`
///
/// JSON is a subset of YAML 1.2, so the pretty-printed document is served
/// as-is.
pub async fn api_docs_yaml() -> impl IntoResponse {
    let body = serde_json::to_string_pretty(&openapi_document()).unwrap_or_default();
    (
        [
            (header::CONTENT_TYPE, "application/yaml"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"api-docs.yaml\""),
        ],
        body,
    )
}

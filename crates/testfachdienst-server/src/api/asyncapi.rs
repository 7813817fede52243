//! AsyncAPI document describing the STOMP channels
//!
//! Destinations depend on the context path, so the document is built per
//! request from the live `StompDestinations`. Payload schemas are shared with
//! the OpenAPI document.

use actix_web::{Responder, get, web};
use serde_json::{Map, Value, json};
use testfachdienst_common::APP_VERSION;

use crate::api::openapi::api_doc;
use crate::model::app_state::AppState;
use crate::ws::{EREZEPT_REPLY_QUEUE, StompDestinations};

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{}", name) })
}

fn channel(address: &str, description: &str, payload: Value) -> Value {
    json!({
        "address": address,
        "description": description,
        "messages": {
            "message": { "contentType": "application/json", "payload": payload }
        }
    })
}

/// Build the AsyncAPI 3 document for the given destinations
pub fn async_api_doc(destinations: &StompDestinations) -> Value {
    let app = destinations.application_prefix();
    let erezept = schema_ref("ERezept");
    let error = schema_ref("WebSocketErrorResponse");

    let mut channels = Map::new();
    channels.insert(
        "erezept.create".into(),
        channel(&format!("{}/erezept.create", app), "Create a prescription", erezept.clone()),
    );
    channels.insert(
        "erezept.list".into(),
        channel(&format!("{}/erezept.list", app), "List all prescriptions", json!({})),
    );
    channels.insert(
        "erezept.read".into(),
        channel(&format!("{}/erezept.read.{{id}}", app), "Read a prescription", json!({})),
    );
    channels.insert(
        "erezept.update".into(),
        channel(
            &format!("{}/erezept.update.{{id}}", app),
            "Update a prescription",
            erezept.clone(),
        ),
    );
    channels.insert(
        "erezept.delete".into(),
        channel(&format!("{}/erezept.delete.{{id}}", app), "Delete a prescription", json!({})),
    );
    channels.insert(
        "erezept.topic".into(),
        channel(destinations.erezept_topic(), "Created and updated prescriptions", erezept.clone()),
    );
    channels.insert(
        "erezept.reply".into(),
        channel(
            &destinations.user_destination(EREZEPT_REPLY_QUEUE),
            "Personal replies and errors of the sending session",
            json!({
                "oneOf": [
                    erezept,
                    { "type": "array", "items": schema_ref("ERezept") },
                    schema_ref("DeleteConfirmation"),
                    error
                ]
            }),
        ),
    );

    let mut operations = Map::new();
    for name in [
        "erezept.create",
        "erezept.list",
        "erezept.read",
        "erezept.update",
        "erezept.delete",
    ] {
        operations.insert(
            name.to_string(),
            json!({
                "action": "receive",
                "channel": { "$ref": format!("#/channels/{}", name) },
                "reply": { "channel": { "$ref": "#/channels/erezept.reply" } }
            }),
        );
    }
    operations.insert(
        "erezept.topic".into(),
        json!({ "action": "send", "channel": { "$ref": "#/channels/erezept.topic" } }),
    );

    let schemas = serde_json::to_value(api_doc().components)
        .ok()
        .and_then(|components| components.get("schemas").cloned())
        .unwrap_or_else(|| json!({}));

    json!({
        "asyncapi": "3.0.0",
        "info": {
            "title": "ZETA Testfachdienst STOMP API",
            "version": APP_VERSION,
            "description": "Prescription management over STOMP on WebSocket endpoint /ws"
        },
        "defaultContentType": "application/json",
        "servers": {
            "stomp": { "host": "localhost:8080", "protocol": "stomp", "pathname": "/ws" }
        },
        "channels": channels,
        "operations": operations,
        "components": { "schemas": schemas }
    })
}

#[get("/springwolf/docs")]
pub async fn springwolf_docs(data: web::Data<AppState>) -> impl Responder {
    web::Json(async_api_doc(&data.destinations))
}

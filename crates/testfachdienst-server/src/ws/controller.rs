//! STOMP application handlers for prescriptions
//!
//! Handles `erezept.create`, `erezept.list`, `erezept.read.{id}`,
//! `erezept.update.{id}` and `erezept.delete.{id}` below the application
//! prefix. Results and errors go to the sender's personal queue, changes are
//! broadcast on the prescription topic.

use std::sync::Arc;

use serde::Serialize;
use testfachdienst_api::{
    DeleteConfirmation, Erezept, ErezeptStatus, validate_payload, validate_payload_with,
};
use tracing::{debug, info, warn};

use crate::metrics;
use crate::service::erezept::ErezeptService;
use crate::ws::broker::StompBroker;
use crate::ws::destinations::{EREZEPT_REPLY_QUEUE, StompDestinations};
use crate::ws::error::WsError;

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ErezeptRoute {
    Create,
    List,
    Read(i64),
    Update(i64),
    Delete(i64),
}

impl ErezeptRoute {
    /// `Ok(None)` for destinations this controller does not serve
    fn parse(destination: &str) -> Result<Option<Self>, WsError> {
        let Some(rest) = destination.strip_prefix("erezept.") else {
            return Ok(None);
        };
        let (action, id) = match rest.split_once('.') {
            Some((action, id)) => (action, Some(id)),
            None => (rest, None),
        };

        let route = match (action, id) {
            ("create", None) => ErezeptRoute::Create,
            ("list", None) => ErezeptRoute::List,
            ("read", Some(id)) => ErezeptRoute::Read(parse_id(id)?),
            ("update", Some(id)) => ErezeptRoute::Update(parse_id(id)?),
            ("delete", Some(id)) => ErezeptRoute::Delete(parse_id(id)?),
            _ => return Ok(None),
        };
        Ok(Some(route))
    }

    fn operation(self) -> &'static str {
        match self {
            ErezeptRoute::Create => "create",
            ErezeptRoute::List => "list",
            ErezeptRoute::Read(_) => "read",
            ErezeptRoute::Update(_) => "update",
            ErezeptRoute::Delete(_) => "delete",
        }
    }
}

fn parse_id(raw: &str) -> Result<i64, WsError> {
    raw.parse()
        .map_err(|_| WsError::bad_request(format!("Invalid ERezept id '{}'", raw)))
}

fn not_found(id: i64) -> WsError {
    WsError::not_found(format!("ERezept with id={} not found", id))
}

fn to_json<T: Serialize>(value: &T) -> Result<Vec<u8>, WsError> {
    serde_json::to_vec(value).map_err(|e| WsError::Unexpected(e.into()))
}

#[derive(Clone)]
pub struct ErezeptWsController {
    service: ErezeptService,
    broker: Arc<StompBroker>,
    destinations: StompDestinations,
}

impl ErezeptWsController {
    pub fn new(
        service: ErezeptService,
        broker: Arc<StompBroker>,
        destinations: StompDestinations,
    ) -> Self {
        Self {
            service,
            broker,
            destinations,
        }
    }

    /// Dispatch a `SEND` to an application destination
    ///
    /// `destination` is the part after the application prefix. Returns `false`
    /// when no handler matches.
    pub async fn handle(&self, session_id: &str, destination: &str, payload: &[u8]) -> bool {
        let route = match ErezeptRoute::parse(destination) {
            Ok(Some(route)) => route,
            Ok(None) => {
                warn!(session = %session_id, destination, "No handler for application destination");
                return false;
            }
            Err(e) => {
                self.reply_error(session_id, "parse", e);
                return true;
            }
        };

        let operation = route.operation();
        let result = match route {
            ErezeptRoute::Create => self.create(session_id, payload).await,
            ErezeptRoute::List => self.list(session_id).await,
            ErezeptRoute::Read(id) => self.read(session_id, id).await,
            ErezeptRoute::Update(id) => self.update(session_id, id, payload).await,
            ErezeptRoute::Delete(id) => self.delete(session_id, id).await,
        };

        match result {
            Ok(()) => metrics::record_erezept_operation("websocket", operation, "success"),
            Err(e) => self.reply_error(session_id, operation, e),
        }
        true
    }

    async fn create(&self, session_id: &str, payload: &[u8]) -> Result<(), WsError> {
        let request = validate_payload_with(payload, Erezept::validate_for_create)?;

        if let Some(id) = request.id
            && self.service.exists_by_id(id).await?
        {
            return Err(WsError::conflict(format!(
                "ERezept with id={} already exists",
                id
            )));
        }
        self.ensure_prescription_id_free(&request.prescription_id)
            .await?;

        let saved = self
            .service
            .save(Erezept {
                id: None,
                status: Some(ErezeptStatus::Created),
                ..request
            })
            .await?;
        info!(
            session = %session_id,
            id = ?saved.id,
            prescription_id = %saved.prescription_id,
            "ERezept created via STOMP"
        );

        self.broadcast(&saved)?;
        self.reply(session_id, &saved)
    }

    async fn list(&self, session_id: &str) -> Result<(), WsError> {
        let all = self.service.find_all().await?;
        debug!(session = %session_id, count = all.len(), "ERezept list via STOMP");
        self.reply(session_id, &all)
    }

    async fn read(&self, session_id: &str, id: i64) -> Result<(), WsError> {
        let found = self
            .service
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))?;
        self.reply(session_id, &found)
    }

    async fn update(&self, session_id: &str, id: i64, payload: &[u8]) -> Result<(), WsError> {
        let request: Erezept = validate_payload(payload)?;
        let existing = self
            .service
            .find_by_id(id)
            .await?
            .ok_or_else(|| not_found(id))?;

        if request.prescription_id != existing.prescription_id {
            self.ensure_prescription_id_free(&request.prescription_id)
                .await?;
        }

        let saved = self
            .service
            .save(Erezept {
                id: existing.id,
                issued_at: existing.issued_at,
                status: request.status.or(existing.status),
                ..request
            })
            .await?;
        info!(session = %session_id, id, "ERezept updated via STOMP");

        self.broadcast(&saved)?;
        self.reply(session_id, &saved)
    }

    async fn delete(&self, session_id: &str, id: i64) -> Result<(), WsError> {
        if !self.service.exists_by_id(id).await? {
            return Err(not_found(id));
        }
        self.service.delete_by_id(id).await?;
        info!(session = %session_id, id, "ERezept deleted via STOMP");

        self.reply(session_id, &DeleteConfirmation::deleted(id))
    }

    async fn ensure_prescription_id_free(&self, prescription_id: &str) -> Result<(), WsError> {
        if self
            .service
            .exists_by_prescription_id(Some(prescription_id))
            .await?
        {
            return Err(WsError::conflict(format!(
                "ERezept with prescriptionId={} already exists",
                prescription_id
            )));
        }
        Ok(())
    }

    fn broadcast<T: Serialize>(&self, value: &T) -> Result<(), WsError> {
        let body = to_json(value)?;
        self.broker
            .broadcast(self.destinations.erezept_topic(), JSON_CONTENT_TYPE, &body);
        Ok(())
    }

    fn reply<T: Serialize>(&self, session_id: &str, value: &T) -> Result<(), WsError> {
        let body = to_json(value)?;
        self.send_personal(session_id, &body);
        Ok(())
    }

    fn reply_error(&self, session_id: &str, operation: &'static str, error: WsError) {
        let response = error.to_response();
        metrics::record_erezept_operation("websocket", operation, &response.status.to_string());
        match serde_json::to_vec(&response) {
            Ok(body) => self.send_personal(session_id, &body),
            Err(e) => warn!(error = %e, "Failed to serialize STOMP error reply"),
        }
    }

    fn send_personal(&self, session_id: &str, body: &[u8]) {
        let destination = self.destinations.user_destination(EREZEPT_REPLY_QUEUE);
        let delivered = self
            .broker
            .send_to_session(session_id, &destination, JSON_CONTENT_TYPE, body);
        if delivered == 0 {
            debug!(
                session = %session_id,
                destination = %destination,
                "Reply dropped, no personal subscription"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::{Value, json};
    use tokio::sync::mpsc::Receiver;

    use super::*;
    use crate::test_support::sqlite_persistence;
    use crate::ws::frame::StompFrame;

    const REPLY: &str = "/user/queue/erezept";
    const TOPIC: &str = "/topic/erezept";

    struct Harness {
        controller: ErezeptWsController,
        broker: Arc<StompBroker>,
    }

    impl Harness {
        async fn new() -> Self {
            let broker = Arc::new(StompBroker::new());
            let controller = ErezeptWsController::new(
                ErezeptService::new(sqlite_persistence().await),
                broker.clone(),
                StompDestinations::new(""),
            );
            Self { controller, broker }
        }

        fn connect(&self, session: &str, topic: bool) -> Receiver<StompFrame> {
            let rx = self.broker.register_session(session);
            self.broker.subscribe(session, "reply", REPLY);
            if topic {
                self.broker.subscribe(session, "topic", TOPIC);
            }
            rx
        }
    }

    fn payload(prescription_id: &str) -> Vec<u8> {
        json!({
            "medicationName": "Metformin 500 mg",
            "dosage": "1-0-1",
            "issuedAt": (Utc::now() - Duration::minutes(1)).to_rfc3339(),
            "patientId": "PAT-1",
            "practitionerId": "PRAC-1",
            "prescriptionId": prescription_id,
        })
        .to_string()
        .into_bytes()
    }

    fn next_json(rx: &mut Receiver<StompFrame>) -> (String, Value) {
        let frame = rx.try_recv().expect("expected a frame");
        let destination = frame.get_header("destination").unwrap().to_string();
        (destination, serde_json::from_slice(&frame.body).unwrap())
    }

    #[test]
    fn test_route_parsing() {
        assert_eq!(
            ErezeptRoute::parse("erezept.create").unwrap(),
            Some(ErezeptRoute::Create)
        );
        assert_eq!(
            ErezeptRoute::parse("erezept.read.42").unwrap(),
            Some(ErezeptRoute::Read(42))
        );
        assert_eq!(ErezeptRoute::parse("erezept.unknown").unwrap(), None);
        assert_eq!(ErezeptRoute::parse("erezept.list.1").unwrap(), None);
        assert_eq!(ErezeptRoute::parse("other.create").unwrap(), None);
        assert!(ErezeptRoute::parse("erezept.delete.abc").is_err());
    }

    #[tokio::test]
    async fn test_create_broadcasts_and_replies() {
        let h = Harness::new().await;
        let mut sender = h.connect("s1", true);
        let mut observer = h.connect("s2", true);

        assert!(h.controller.handle("s1", "erezept.create", &payload("RX-WS-1")).await);

        let (dest, broadcast) = next_json(&mut sender);
        assert_eq!(dest, TOPIC);
        assert_eq!(broadcast["status"], "CREATED");
        let (dest, reply) = next_json(&mut sender);
        assert_eq!(dest, REPLY);
        assert!(reply["id"].as_i64().is_some());

        let (dest, _) = next_json(&mut observer);
        assert_eq!(dest, TOPIC);
        // personal replies never reach other sessions
        assert!(observer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_create_forces_created_status() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        let mut body: Value = serde_json::from_slice(&payload("RX-WS-2")).unwrap();
        body["status"] = json!("DISPENSED");

        h.controller
            .handle("s1", "erezept.create", body.to_string().as_bytes())
            .await;
        let (_, reply) = next_json(&mut rx);
        assert_eq!(reply["status"], "CREATED");
    }

    #[tokio::test]
    async fn test_create_conflicts() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);

        h.controller.handle("s1", "erezept.create", &payload("RX-WS-3")).await;
        let (_, created) = next_json(&mut rx);

        h.controller.handle("s1", "erezept.create", &payload("RX-WS-3")).await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 409);
        assert_eq!(
            error["message"],
            "ERezept with prescriptionId=RX-WS-3 already exists"
        );

        let mut with_id: Value = serde_json::from_slice(&payload("RX-WS-4")).unwrap();
        with_id["id"] = created["id"].clone();
        h.controller
            .handle("s1", "erezept.create", with_id.to_string().as_bytes())
            .await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 409);
        assert_eq!(
            error["message"],
            format!("ERezept with id={} already exists", created["id"])
        );
    }

    #[tokio::test]
    async fn test_validation_and_conversion_errors() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);

        h.controller
            .handle("s1", "erezept.create", br#"{"dosage":"1-0-0"}"#)
            .await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 400);
        assert_eq!(error["message"], "Validation failed");
        assert_eq!(
            error["details"]["errors"]["medicationName"],
            "must not be blank"
        );

        h.controller.handle("s1", "erezept.create", b"not json").await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 400);
        assert_eq!(
            error["message"],
            "Invalid message format or missing required fields"
        );
        assert!(error["details"]["error"].is_string());
    }

    #[tokio::test]
    async fn test_read_list_and_missing() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        h.controller.handle("s1", "erezept.create", &payload("RX-WS-5")).await;
        let (_, created) = next_json(&mut rx);
        let id = created["id"].as_i64().unwrap();

        h.controller
            .handle("s1", &format!("erezept.read.{}", id), b"")
            .await;
        let (_, read) = next_json(&mut rx);
        assert_eq!(read["prescriptionId"], "RX-WS-5");

        h.controller.handle("s1", "erezept.list", b"").await;
        let (_, list) = next_json(&mut rx);
        assert_eq!(list.as_array().unwrap().len(), 1);

        h.controller.handle("s1", "erezept.read.999", b"").await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 404);
        assert_eq!(error["message"], "ERezept with id=999 not found");
    }

    #[tokio::test]
    async fn test_update_keeps_id_issued_at_and_status() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        h.controller.handle("s1", "erezept.create", &payload("RX-WS-6")).await;
        let (_, created) = next_json(&mut rx);
        let id = created["id"].as_i64().unwrap();

        let mut change: Value = serde_json::from_slice(&payload("RX-WS-6b")).unwrap();
        change["dosage"] = json!("2-0-2");
        change["status"] = Value::Null;
        h.controller
            .handle(
                "s1",
                &format!("erezept.update.{}", id),
                change.to_string().as_bytes(),
            )
            .await;
        let (_, updated) = next_json(&mut rx);
        assert_eq!(updated["id"], id);
        assert_eq!(updated["dosage"], "2-0-2");
        assert_eq!(updated["prescriptionId"], "RX-WS-6b");
        assert_eq!(updated["issuedAt"], created["issuedAt"]);
        assert_eq!(updated["status"], "CREATED");
    }

    #[tokio::test]
    async fn test_update_without_issued_at_keeps_stored_value() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        h.controller.handle("s1", "erezept.create", &payload("RX-WS-8")).await;
        let (_, created) = next_json(&mut rx);
        let id = created["id"].as_i64().unwrap();

        let mut change: Value = serde_json::from_slice(&payload("RX-WS-8")).unwrap();
        change.as_object_mut().unwrap().remove("issuedAt");
        change["medicationName"] = json!("Paracetamol 500 mg");
        h.controller
            .handle(
                "s1",
                &format!("erezept.update.{}", id),
                change.to_string().as_bytes(),
            )
            .await;
        let (dest, updated) = next_json(&mut rx);
        assert_eq!(dest, REPLY);
        assert_eq!(updated["medicationName"], "Paracetamol 500 mg");
        assert_eq!(updated["issuedAt"], created["issuedAt"]);
    }

    #[tokio::test]
    async fn test_create_without_issued_at_rejected() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        let mut body: Value = serde_json::from_slice(&payload("RX-WS-9")).unwrap();
        body.as_object_mut().unwrap().remove("issuedAt");

        h.controller
            .handle("s1", "erezept.create", body.to_string().as_bytes())
            .await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 400);
        assert_eq!(
            error["details"]["errors"]["issuedAt"],
            "must not be null"
        );
    }

    #[tokio::test]
    async fn test_update_conflicting_prescription_id() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        h.controller.handle("s1", "erezept.create", &payload("RX-A")).await;
        let (_, first) = next_json(&mut rx);
        h.controller.handle("s1", "erezept.create", &payload("RX-B")).await;
        next_json(&mut rx);

        h.controller
            .handle(
                "s1",
                &format!("erezept.update.{}", first["id"]),
                &payload("RX-B"),
            )
            .await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 409);

        h.controller
            .handle("s1", "erezept.update.4711", &payload("RX-C"))
            .await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 404);
    }

    #[tokio::test]
    async fn test_delete() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);
        h.controller.handle("s1", "erezept.create", &payload("RX-WS-7")).await;
        let (_, created) = next_json(&mut rx);
        let id = created["id"].as_i64().unwrap();

        h.controller
            .handle("s1", &format!("erezept.delete.{}", id), b"")
            .await;
        let (_, reply) = next_json(&mut rx);
        assert_eq!(reply, json!({"id": id, "status": "deleted"}));

        h.controller
            .handle("s1", &format!("erezept.delete.{}", id), b"")
            .await;
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 404);
    }

    #[tokio::test]
    async fn test_invalid_id_and_unknown_route() {
        let h = Harness::new().await;
        let mut rx = h.connect("s1", false);

        assert!(h.controller.handle("s1", "erezept.read.abc", b"").await);
        let (_, error) = next_json(&mut rx);
        assert_eq!(error["status"], 400);

        assert!(!h.controller.handle("s1", "erezept.archive", b"").await);
        assert!(rx.try_recv().is_err());
    }
}

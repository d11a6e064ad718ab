//! In-memory transport for component tests.

use std::cell::RefCell;

use anyhow::{bail, Error};
use serde_json::Value;

use super::{RedfishResponse, RedfishTransport};

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Call {
    pub method: &'static str,
    pub path: String,
    pub body: Option<Value>,
}

type Responder = Box<dyn Fn(&Call) -> Option<RedfishResponse>>;

/// Answers requests with the first matching responder and records every call.
/// Requests nothing answers fail at the transport level.
#[derive(Default)]
pub(crate) struct MockTransport {
    responders: Vec<Responder>,
    calls: RefCell<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a responder consulted in insertion order.
    pub fn on(mut self, responder: impl Fn(&Call) -> Option<RedfishResponse> + 'static) -> Self {
        self.responders.push(Box::new(responder));
        self
    }

    /// Answers every request with `method` on exactly `path`.
    pub fn route(
        self,
        method: &'static str,
        path: impl Into<String>,
        response: RedfishResponse,
    ) -> Self {
        let path = path.into();
        self.on(move |call| (call.method == method && call.path == path).then(|| response.clone()))
    }

    /// Answers every GET of `path` with a JSON body.
    pub fn get_json(self, path: impl Into<String>, body: Value) -> Self {
        self.route("GET", path, RedfishResponse::new(200).with_body(body.to_string()))
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, method: &str) -> Vec<Call> {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.method == method)
            .cloned()
            .collect()
    }

    fn handle(
        &self,
        method: &'static str,
        path: &str,
        body: Option<&Value>,
    ) -> Result<RedfishResponse, Error> {
        let call = Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
        };
        self.calls.borrow_mut().push(call.clone());

        match self.responders.iter().find_map(|responder| responder(&call)) {
            Some(response) => Ok(response),
            None => bail!("No mock response for {method} '{path}'"),
        }
    }
}

impl RedfishTransport for MockTransport {
    fn get(&self, path: &str) -> Result<RedfishResponse, Error> {
        self.handle("GET", path, None)
    }

    fn patch(&self, path: &str, body: &Value) -> Result<RedfishResponse, Error> {
        self.handle("PATCH", path, Some(body))
    }

    fn post(&self, path: &str, body: &Value) -> Result<RedfishResponse, Error> {
        self.handle("POST", path, Some(body))
    }
}

//! In-memory agent for unit tests.

use crate::agent::HttpAgent;
use serde_json::Value;
use sofa_core::{Error, RawResponse, Request, Result};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Replays queued responses and records every request it sees.
#[derive(Default)]
pub(crate) struct MockAgent {
    responses: Mutex<VecDeque<Result<RawResponse>>>,
    requests: Mutex<Vec<Request>>,
}

impl MockAgent {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn push(&self, raw: RawResponse) {
        self.responses.lock().unwrap().push_back(Ok(raw));
    }

    pub(crate) fn push_json(&self, status: u16, body: Value) {
        self.push(RawResponse {
            status,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: serde_json::to_vec(&body).unwrap(),
            request_headers: Vec::new(),
        });
    }

    pub(crate) fn push_status(&self, status: u16) {
        self.push(RawResponse {
            status,
            ..Default::default()
        });
    }

    pub(crate) fn push_failure(&self, code: u32, text: &str) {
        self.responses.lock().unwrap().push_back(Err(Error::Transport {
            code,
            text: text.to_string(),
        }));
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub(crate) fn last_request(&self) -> Request {
        self.requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no request recorded")
    }
}

#[async_trait::async_trait]
impl HttpAgent for MockAgent {
    async fn run(&self, request: &Request) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(Error::Transport {
                    code: 2,
                    text: "no response queued".to_string(),
                })
            })
    }
}

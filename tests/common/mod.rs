//! Scripted collaborators shared by the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use paidflow::services::{
    Answers, DecodedPaymentRequest, LndHandle, PaymentClient, PaymentReceipt, Prompt, Question,
    ServiceCatalog, ServiceLogger, ServiceResponse, ServiceSchema, ServiceSummary,
};
use paidflow::CapabilityError;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub fn node_key() -> String {
    format!("A1B2{}", "c3".repeat(31))
}

/// Answers each `ask` call with the next scripted batch; empty once exhausted.
#[derive(Default)]
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Answers>>,
    pub asked: Mutex<Vec<Vec<Question>>>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<Value>) -> Arc<Self> {
        let answers = answers
            .into_iter()
            .map(|value| match value {
                Value::Object(map) => map,
                _ => Map::new(),
            })
            .collect();
        Arc::new(Self {
            answers: Mutex::new(answers),
            asked: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.asked.lock().len()
    }
}

#[async_trait]
impl Prompt for ScriptedPrompt {
    async fn ask(&self, questions: Vec<Question>) -> Answers {
        self.asked.lock().push(questions);
        self.answers.lock().pop_front().unwrap_or_default()
    }
}

pub struct MockCatalog {
    pub services: Result<Vec<ServiceSummary>, CapabilityError>,
    pub schema: ServiceSchema,
    pub response: Result<ServiceResponse, CapabilityError>,
    pub schema_requests: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<(String, Map<String, Value>)>>,
    pub calls: AtomicUsize,
}

impl MockCatalog {
    pub fn new(names: &[&str], schema: ServiceSchema, response: ServiceResponse) -> Self {
        Self {
            services: Ok(names
                .iter()
                .map(|name| ServiceSummary {
                    name: name.to_string(),
                    description: None,
                })
                .collect()),
            schema,
            response: Ok(response),
            schema_requests: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ServiceCatalog for MockCatalog {
    async fn list_services(
        &self,
        _node: &str,
        _network: &str,
    ) -> Result<Vec<ServiceSummary>, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.services.clone()
    }

    async fn get_service_schema(
        &self,
        _node: &str,
        _network: &str,
        named: &str,
    ) -> Result<ServiceSchema, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.schema_requests.lock().push(named.to_string());
        Ok(self.schema.clone())
    }

    async fn make_service_request(
        &self,
        _node: &str,
        _network: &str,
        id: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ServiceResponse, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .push((id.to_string(), arguments.clone()));
        self.response.clone()
    }
}

pub struct MockPayments {
    pub decoded_tokens: u64,
    pub outcome: Result<PaymentReceipt, CapabilityError>,
    pub decoded: Mutex<Vec<String>>,
    pub payments: Mutex<Vec<(String, u64)>>,
}

impl MockPayments {
    pub fn paying(tokens: u64) -> Self {
        Self {
            decoded_tokens: tokens,
            outcome: Ok(PaymentReceipt { tokens, fee: 1 }),
            decoded: Mutex::new(Vec::new()),
            payments: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(tokens: u64, err: CapabilityError) -> Self {
        Self {
            outcome: Err(err),
            ..Self::paying(tokens)
        }
    }

    pub fn pay_calls(&self) -> usize {
        self.payments.lock().len()
    }
}

#[async_trait]
impl PaymentClient for MockPayments {
    fn decode_payment_request(
        &self,
        request: &str,
    ) -> Result<DecodedPaymentRequest, CapabilityError> {
        self.decoded.lock().push(request.to_string());
        if !request.starts_with("lnbc") {
            return Err(CapabilityError::MalformedPaymentRequest(request.to_string()));
        }
        Ok(DecodedPaymentRequest {
            tokens: self.decoded_tokens,
        })
    }

    async fn pay(&self, request: &str, max_fee: u64) -> Result<PaymentReceipt, CapabilityError> {
        self.payments.lock().push((request.to_string(), max_fee));
        self.outcome.clone()
    }
}

#[derive(Default)]
pub struct RecordingLogger {
    pub records: Mutex<Vec<Value>>,
}

impl ServiceLogger for RecordingLogger {
    fn info(&self, record: Value) {
        self.records.lock().push(record);
    }
}

/// Everything a paid service run needs, with handles kept for assertions.
pub struct Harness {
    pub prompt: Arc<ScriptedPrompt>,
    pub catalog: Arc<MockCatalog>,
    pub payments: Arc<MockPayments>,
    pub logger: Arc<RecordingLogger>,
}

impl Harness {
    pub fn new(prompt: Arc<ScriptedPrompt>, catalog: MockCatalog, payments: MockPayments) -> Self {
        Self {
            prompt,
            catalog: Arc::new(catalog),
            payments: Arc::new(payments),
            logger: Arc::new(RecordingLogger::default()),
        }
    }

    pub fn lnd(&self) -> LndHandle {
        LndHandle::new(self.catalog.clone(), self.payments.clone())
    }

    pub fn args(&self) -> paidflow::PaidServiceArgs {
        paidflow::PaidServiceArgs::new()
            .ask(self.prompt.clone())
            .lnd(self.lnd())
            .logger(self.logger.clone())
            .network("btc")
            .node(node_key())
    }

    pub fn records(&self) -> Vec<Value> {
        self.logger.records.lock().clone()
    }
}

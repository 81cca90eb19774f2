//! External collaborators of the paid service flow.
//!
//! Everything here is consumed as an opaque async capability: interactive
//! prompting, the remote service catalog, the payment client, and the
//! structured logger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::core::errors::CapabilityError;

/// Answers to a batch of questions, keyed by question name.
pub type Answers = Map<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum QuestionKind {
    /// Pick one of `choices`.
    List { choices: Vec<String> },
    /// Yes or no.
    Confirm,
    /// Free text.
    Input { max_length: Option<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(flatten)]
    pub kind: QuestionKind,
}

impl Question {
    pub fn list(name: impl Into<String>, message: impl Into<String>, choices: Vec<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            prefix: None,
            kind: QuestionKind::List { choices },
        }
    }

    pub fn confirm(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            prefix: None,
            kind: QuestionKind::Confirm,
        }
    }

    pub fn input(
        name: impl Into<String>,
        message: impl Into<String>,
        max_length: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            prefix: None,
            kind: QuestionKind::Input { max_length },
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

/// Presents questions and returns the answers. An unanswered question is
/// simply missing from the result; prompting never fails.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn ask(&self, questions: Vec<Question>) -> Answers;
}

/// A service as advertised by the catalog listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSummary {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An argument a service asks the caller to fill in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceField {
    pub name: String,
    pub description: String,
    /// Maximum length of the value, in characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchema {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<ServiceField>,
}

/// Response of a service request.
///
/// `paywall`, when present, is a payment request the caller may settle.
/// Everything else the service returned is kept in `fields`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paywall: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ServiceResponse {
    pub fn with_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_paywall(paywall: impl Into<String>) -> Self {
        Self {
            paywall: Some(paywall.into()),
            ..Default::default()
        }
    }

    /// Drops every extra attribute whose value is JSON `null`, whether the
    /// service omitted it or sent an explicit `null`. Absent `paywall` and
    /// `text` are already skipped when serializing.
    pub fn redacted(mut self) -> Self {
        self.fields.retain(|_, value| !value.is_null());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedPaymentRequest {
    /// Requested amount in base units.
    pub tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    /// Amount paid in base units, excluding fees.
    pub tokens: u64,
    #[serde(default)]
    pub fee: u64,
}

/// Catalog of remotely defined services reachable through a node.
#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    async fn list_services(
        &self,
        node: &str,
        network: &str,
    ) -> Result<Vec<ServiceSummary>, CapabilityError>;

    async fn get_service_schema(
        &self,
        node: &str,
        network: &str,
        named: &str,
    ) -> Result<ServiceSchema, CapabilityError>;

    async fn make_service_request(
        &self,
        node: &str,
        network: &str,
        id: &str,
        arguments: &Map<String, Value>,
    ) -> Result<ServiceResponse, CapabilityError>;
}

#[async_trait]
pub trait PaymentClient: Send + Sync {
    fn decode_payment_request(&self, request: &str)
        -> Result<DecodedPaymentRequest, CapabilityError>;

    /// Pays `request`, refusing routes whose fee exceeds `max_fee`.
    async fn pay(&self, request: &str, max_fee: u64) -> Result<PaymentReceipt, CapabilityError>;
}

/// Fire-and-forget structured logger.
pub trait ServiceLogger: Send + Sync {
    fn info(&self, record: Value);
}

/// Authenticated network handle: the catalog and payment clients of one node.
#[derive(Clone)]
pub struct LndHandle {
    pub catalog: Arc<dyn ServiceCatalog>,
    pub payments: Arc<dyn PaymentClient>,
}

impl LndHandle {
    pub fn new(catalog: Arc<dyn ServiceCatalog>, payments: Arc<dyn PaymentClient>) -> Self {
        Self { catalog, payments }
    }

    /// Handle backed by a single client implementing both capabilities.
    pub fn from_client<C>(client: Arc<C>) -> Self
    where
        C: ServiceCatalog + PaymentClient + 'static,
    {
        Self {
            catalog: client.clone(),
            payments: client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn redaction_drops_null_attributes() {
        let response: ServiceResponse = serde_json::from_value(json!({
            "text": "ok",
            "paywall": null,
            "links": null,
            "nodes": ["a"],
        }))
        .unwrap();

        assert_eq!(
            serde_json::to_value(response.redacted()).unwrap(),
            json!({"text": "ok", "nodes": ["a"]})
        );
    }

    #[test]
    fn questions_serialize_flat() {
        let question = Question::confirm("confirm", "Confirm?").with_prefix("[Pay 0.00001000]");
        assert_eq!(
            serde_json::to_value(&question).unwrap(),
            json!({
                "name": "confirm",
                "message": "Confirm?",
                "prefix": "[Pay 0.00001000]",
                "type": "confirm",
            })
        );
    }
}

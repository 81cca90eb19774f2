//! Use a paid service offered by a remote node.
//!
//! The flow lists the node's services, lets the user pick one, collects its
//! arguments, sends the request and, when the response carries a paywall,
//! asks for confirmation before paying it. Each step is a task in a graph run
//! by [`DagExecutor`]; the paywall steps complete with the absence marker when
//! there is nothing to pay.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::capabilities::{
    LndHandle, PaymentReceipt, Prompt, Question, ServiceLogger, ServiceResponse, ServiceSchema,
    ServiceSummary,
};
use super::confirm::{confirm_service_use, format_tokens, ServiceConfirmation};
use crate::core::errors::{CapabilityError, DagError, PaidServiceError, ValidationError};
use crate::dag_flow::{DagExecutor, Dependencies, Plan, TaskAction, TaskOutput};

/// Fee ceiling for paywall payments, in base units.
pub const DEFAULT_MAX_FEE: u64 = 1337;

pub const GET_SERVICES: &str = "getServices";
pub const CHOOSE_SERVICE: &str = "chooseService";
pub const GET_SERVICE: &str = "getService";
pub const CONFIRM_SERVICE: &str = "confirmService";
pub const SEND_REQUEST: &str = "sendRequest";
pub const RESULT: &str = "result";
pub const CONFIRM_PAYMENT: &str = "confirmPayment";
pub const PAY: &str = "pay";
pub const PAID_TOTAL: &str = "paidTotal";

/// True for a 66 character hex node public key.
pub fn is_public_key(node: &str) -> bool {
    node.len() == 66 && node.chars().all(|c| c.is_ascii_hexdigit())
}

/// Inputs of [`use_paid_service`]. Every field is required.
#[derive(Clone, Default)]
pub struct PaidServiceArgs {
    pub ask: Option<Arc<dyn Prompt>>,
    pub lnd: Option<LndHandle>,
    pub logger: Option<Arc<dyn ServiceLogger>>,
    pub network: Option<String>,
    pub node: Option<String>,
}

impl fmt::Debug for PaidServiceArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaidServiceArgs")
            .field("ask", &self.ask.is_some())
            .field("lnd", &self.lnd.is_some())
            .field("logger", &self.logger.is_some())
            .field("network", &self.network)
            .field("node", &self.node)
            .finish()
    }
}

impl PaidServiceArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ask(mut self, ask: Arc<dyn Prompt>) -> Self {
        self.ask = Some(ask);
        self
    }

    pub fn lnd(mut self, lnd: LndHandle) -> Self {
        self.lnd = Some(lnd);
        self
    }

    pub fn logger(mut self, logger: Arc<dyn ServiceLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    /// Checks the arguments, cheapest first, without touching any capability.
    pub fn validate(self) -> Result<PaidService, ValidationError> {
        let ask = self.ask.ok_or(ValidationError::MissingPrompt)?;
        let lnd = self.lnd.ok_or(ValidationError::MissingLnd)?;
        let logger = self.logger.ok_or(ValidationError::MissingLogger)?;
        let network = self
            .network
            .filter(|network| !network.is_empty())
            .ok_or(ValidationError::MissingNetwork)?;
        let node = self
            .node
            .filter(|node| is_public_key(node))
            .ok_or(ValidationError::InvalidNodeIdentity)?;

        Ok(PaidService {
            inner: Arc::new(Inner {
                ask,
                lnd,
                logger,
                network,
                node,
            }),
        })
    }
}

/// Runs the flow with a sequential executor.
pub async fn use_paid_service(args: PaidServiceArgs) -> Result<ServiceResponse, PaidServiceError> {
    use_paid_service_with(&DagExecutor::default(), args).await
}

/// Runs the flow on `executor`.
///
/// Resolves with the redacted service response, whether or not a paywall was
/// paid, or with the first error of the run.
pub async fn use_paid_service_with(
    executor: &DagExecutor,
    args: PaidServiceArgs,
) -> Result<ServiceResponse, PaidServiceError> {
    let service = args.validate()?;
    service.run(executor).await
}

/// Validated inputs of the flow.
#[derive(Clone)]
pub struct PaidService {
    inner: Arc<Inner>,
}

impl fmt::Debug for PaidService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaidService")
            .field("network", &self.inner.network)
            .field("node", &self.inner.node)
            .finish_non_exhaustive()
    }
}

struct Inner {
    ask: Arc<dyn Prompt>,
    lnd: LndHandle,
    logger: Arc<dyn ServiceLogger>,
    network: String,
    node: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceSelection {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PaymentConfirmation {
    confirm: bool,
}

impl PaidService {
    pub fn node(&self) -> &str {
        &self.inner.node
    }

    pub fn network(&self) -> &str {
        &self.inner.network
    }

    /// The task graph of the flow.
    pub fn plan(&self) -> Plan<PaidServiceError> {
        Plan::new()
            .task(GET_SERVICES, &[], self.step(Step::GetServices))
            .task(CHOOSE_SERVICE, &[GET_SERVICES], self.step(Step::ChooseService))
            .task(GET_SERVICE, &[CHOOSE_SERVICE], self.step(Step::GetService))
            .task(CONFIRM_SERVICE, &[GET_SERVICE], self.step(Step::ConfirmService))
            .task(
                SEND_REQUEST,
                &[CONFIRM_SERVICE, GET_SERVICE],
                self.step(Step::SendRequest),
            )
            .task(RESULT, &[SEND_REQUEST], self.step(Step::Result))
            .task(CONFIRM_PAYMENT, &[RESULT], self.step(Step::ConfirmPayment))
            .task(PAY, &[CONFIRM_PAYMENT, RESULT], self.step(Step::Pay))
            .task(PAID_TOTAL, &[PAY], self.step(Step::PaidTotal))
    }

    pub async fn run(&self, executor: &DagExecutor) -> Result<ServiceResponse, PaidServiceError> {
        info!(node = %self.inner.node, network = %self.inner.network, "Using paid service");
        let context = executor.execute(self.plan()).await?;
        let response = context.get_as::<ServiceResponse>(RESULT)?;
        response.ok_or_else(|| {
            PaidServiceError::from(DagError::AbsentDependency {
                task: "usePaidService".to_string(),
                dependency: RESULT.to_string(),
            })
        })
    }

    fn step(&self, step: Step) -> PaidServiceStep {
        PaidServiceStep {
            step,
            inner: self.inner.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Step {
    GetServices,
    ChooseService,
    GetService,
    ConfirmService,
    SendRequest,
    Result,
    ConfirmPayment,
    Pay,
    PaidTotal,
}

struct PaidServiceStep {
    step: Step,
    inner: Arc<Inner>,
}

#[async_trait]
impl TaskAction<PaidServiceError> for PaidServiceStep {
    async fn run(&self, deps: Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let inner = &self.inner;
        match self.step {
            Step::GetServices => inner.get_services().await,
            Step::ChooseService => inner.choose_service(&deps).await,
            Step::GetService => inner.get_service(&deps).await,
            Step::ConfirmService => inner.confirm_service(&deps).await,
            Step::SendRequest => inner.send_request(&deps).await,
            Step::Result => inner.result(&deps),
            Step::ConfirmPayment => inner.confirm_payment(&deps).await,
            Step::Pay => inner.pay(&deps).await,
            Step::PaidTotal => inner.paid_total(&deps),
        }
    }
}

/// An empty string counts as missing.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn output<T: Serialize>(task: &str, value: &T) -> Result<TaskOutput, PaidServiceError> {
    Ok(TaskOutput::from_serialize(task, value)?)
}

impl Inner {
    async fn get_services(&self) -> Result<TaskOutput, PaidServiceError> {
        let services = self
            .lnd
            .catalog
            .list_services(&self.node, &self.network)
            .await?;
        debug!(count = services.len(), "Listed services");
        output(GET_SERVICES, &services)
    }

    async fn choose_service(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let services: Vec<ServiceSummary> = deps.require(GET_SERVICES)?;
        let mut choices: Vec<String> = services.into_iter().map(|s| s.name).collect();
        choices.sort();

        let answers = self
            .ask
            .ask(vec![Question::list("name", "Choose service:", choices.clone())])
            .await;

        match answers.get("name").and_then(Value::as_str) {
            Some(name) if choices.iter().any(|choice| choice == name) => output(
                CHOOSE_SERVICE,
                &ServiceSelection {
                    name: name.to_string(),
                },
            ),
            Some(name) => Err(CapabilityError::ServiceNotFound(name.to_string()).into()),
            None => Err(CapabilityError::ServiceNotFound("no service selected".to_string()).into()),
        }
    }

    async fn get_service(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let selection: ServiceSelection = deps.require(CHOOSE_SERVICE)?;
        let schema = self
            .lnd
            .catalog
            .get_service_schema(&self.node, &self.network, &selection.name)
            .await?;
        output(GET_SERVICE, &schema)
    }

    async fn confirm_service(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let schema: ServiceSchema = deps.require(GET_SERVICE)?;
        let confirmation =
            confirm_service_use(self.ask.as_ref(), schema.description.as_deref(), &schema.fields)
                .await;
        output(CONFIRM_SERVICE, &confirmation)
    }

    async fn send_request(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let confirmation: ServiceConfirmation = deps.require(CONFIRM_SERVICE)?;
        let schema: ServiceSchema = deps.require(GET_SERVICE)?;
        let response = self
            .lnd
            .catalog
            .make_service_request(&self.node, &self.network, &schema.id, &confirmation.arguments)
            .await?;
        output(SEND_REQUEST, &response)
    }

    fn result(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let response = deps.require::<ServiceResponse>(SEND_REQUEST)?.redacted();
        self.logger.info(json!({ "service_response": response }));
        output(RESULT, &response)
    }

    async fn confirm_payment(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let response: ServiceResponse = deps.require(RESULT)?;
        let Some(paywall) = non_empty(&response.paywall) else {
            return Ok(TaskOutput::Absent);
        };

        let decoded = self.lnd.payments.decode_payment_request(paywall)?;
        let message = non_empty(&response.text).unwrap_or("Confirm?");
        let question = Question::confirm("confirm", message)
            .with_prefix(format!("[Pay {}]", format_tokens(decoded.tokens)));

        let answers = self.ask.ask(vec![question]).await;
        let confirm = answers
            .get("confirm")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        output(CONFIRM_PAYMENT, &PaymentConfirmation { confirm })
    }

    async fn pay(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let response: ServiceResponse = deps.require(RESULT)?;
        let Some(paywall) = non_empty(&response.paywall) else {
            return Ok(TaskOutput::Absent);
        };

        let confirmation: Option<PaymentConfirmation> = deps.get(CONFIRM_PAYMENT)?;
        if !confirmation.is_some_and(|c| c.confirm) {
            debug!("Paywall declined");
            return Ok(TaskOutput::Absent);
        }

        let receipt = self.lnd.payments.pay(paywall, DEFAULT_MAX_FEE).await?;
        output(PAY, &receipt)
    }

    fn paid_total(&self, deps: &Dependencies) -> Result<TaskOutput, PaidServiceError> {
        let Some(receipt) = deps.get::<PaymentReceipt>(PAY)? else {
            return Ok(TaskOutput::Absent);
        };

        self.logger
            .info(json!({ "success": { "paid": format_tokens(receipt.tokens) } }));
        Ok(TaskOutput::Absent)
    }
}

pub mod capabilities;
pub mod confirm;
pub mod paid_service;

pub use capabilities::{
    Answers, DecodedPaymentRequest, LndHandle, PaymentClient, PaymentReceipt, Prompt, Question,
    QuestionKind, ServiceCatalog, ServiceField, ServiceLogger, ServiceResponse, ServiceSchema,
    ServiceSummary,
};
pub use confirm::{confirm_service_use, format_tokens, ServiceConfirmation};
pub use paid_service::{
    is_public_key, use_paid_service, use_paid_service_with, PaidService, PaidServiceArgs,
    DEFAULT_MAX_FEE,
};

pub mod config;
pub mod errors;

pub use config::DagConfig;
pub use errors::{
    CapabilityError, DagError, GraphDefinitionError, PaidServiceError, ValidationError,
};

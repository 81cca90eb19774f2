pub mod dag_flow;
mod dag_flow_parallel;
pub mod events;
pub mod function_action;
pub mod planning;

pub use dag_flow::*;
pub use events::{BufferingEventSink, EventSink, LoggingEventSink, RuntimeEvent, RuntimeEventEnvelope};
pub use function_action::FnAction;
pub use planning::Plan;

//! Network collaborators: the annotation service and the automation executor.
//!
//! The pipeline only sees the traits; the HTTP implementations are thin wrappers
//! around the service endpoints.

pub mod annotate;
pub mod execute;

pub use annotate::{AnnotationClient, HttpAnnotationClient};
pub use execute::{AutomationExecutor, HttpAutomationExecutor};

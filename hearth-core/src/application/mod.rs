//! Application Layer - request admission

pub mod admission;
pub mod errors;

pub use admission::{Admission, AdmissionPipeline, AdmissionRequest, AdmissionStage, parse_bearer};
pub use errors::AdmissionRejection;

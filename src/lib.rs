pub mod error;
pub mod k8s;
pub mod report;

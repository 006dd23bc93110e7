// Extractor binary management — provisioning and metadata probes.

pub mod provision;
pub mod title;

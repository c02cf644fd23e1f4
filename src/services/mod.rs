pub mod allocator;
pub mod generator;
pub mod policy;
pub mod scheduler;
pub mod similarity;
pub mod status;
pub mod verifier;

pub use generator::{GenerationReport, GenerationTarget, GeneratorService};
pub use status::{StatusService, VerificationStatus};
pub use verifier::{VerifierService, VerifyTarget};

pub mod classifier;
pub mod matcher;
pub mod variance;
pub mod verifier;

pub use verifier::{reconcile, DocumentTriple, VerificationService, VerifyRequest};

mod ids;
mod signature;

pub use ids::{ItemInstanceId, JobId};
pub use signature::JobSignature;

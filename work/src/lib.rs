//! Proof-of-work validation and generation.
//!
//! Every block carries a 64-bit nonce whose Blake2b-8 digest over
//! `nonce ‖ root` must meet the network threshold. Generation here is the
//! simple scan used by tests and the work pool; real deployments offload
//! generation to dedicated threads.

pub mod generator;
pub mod thresholds;
pub mod validator;

pub use generator::generate_work;
pub use thresholds::work_threshold;
pub use validator::{validate_work, work_difficulty};

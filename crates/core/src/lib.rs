//! Domain types for the TF-IDF featurization job workflow.
//!
//! This crate performs no I/O. It owns the job specification and its
//! validation, the job status state machine, S3 output layout, image
//! references, naming rules and the featurization script's argument
//! list. Network and process collaborators live in
//! `featurize-processing` and `featurize-cloud`.

pub mod error;
pub mod image;
pub mod job;
pub mod layout;
pub mod naming;
pub mod script_args;
pub mod status;
pub mod types;

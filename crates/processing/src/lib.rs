//! Client and workflow for the managed job-execution service.
//!
//! Provides the HTTP API wrapper and its SigV4 signer, the [`service::ProcessingService`]
//! seam the workflow is written against, the submit/poll
//! [`workflow::JobWorkflow`], and an optional caller-driven backoff
//! poller.

pub mod api;
pub mod poll;
pub mod service;
pub mod signing;
pub mod wire;
pub mod workflow;

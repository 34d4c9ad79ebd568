//! External collaborators of the featurization workflow.
//!
//! - [`container`]: builds, authenticates and pushes the processing
//!   image through the `docker` and `aws` command-line tools.
//! - [`storage`]: stages files into S3 and inspects the output prefixes
//!   the job writes.

pub mod container;
pub mod storage;

//! `featurize` -- runs the TF-IDF featurization workflow from the shell.
//!
//! Each subcommand is one step: build and push the image, derive the
//! S3 layout, stage the script and submit the job, then poll or watch
//! it and inspect what it wrote.

pub mod args;
pub mod commands;

//! Route GPU jobs to a batch scheduler or a container orchestrator.
//!
//! A job manifest is validated into a [`core::job::JobSpec`], checked against
//! the owning team's GPU ceiling, dispatched by category to Slurm or
//! Kubernetes, and reported as a single [`core::submission::SubmissionResult`].

pub mod backend;
pub mod config;
pub mod core;
pub mod process;
pub mod utils;

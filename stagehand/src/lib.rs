//! Staged end-to-end validation scenarios for the Cloud Build examples.
//!
//! Each scenario provisions an example with Terraform, drives it through
//! kubectl, gcloud and git, and tears it down again. Stages record what they
//! produce in a per-run state directory so a re-run can skip finished work.

#![forbid(unsafe_code)]

pub mod cli;
pub mod scenarios;
pub mod toolbox;
pub mod workspace;

//! Kubernetes access for the analyzers.
//!
//! This module provides native Kubernetes API access using kube-rs:
//! connection setup, typed read-only accessors and the Prometheus Operator
//! custom resource definitions.

pub mod client;
pub mod crds;
pub mod state;

pub use client::{ClusterConnection, ConnectionError};
pub use state::{AccessError, ClusterState};

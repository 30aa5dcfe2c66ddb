//! Mock Kubernetes API server for testing.
//!
//! Provides an HTTP server that can be used with kubeconfig-based connections.

pub mod discovery;
pub mod http;
mod selector;

pub use discovery::{MockApiResource, MockDiscovery};
pub use http::{HttpMockK8sServer, MockFailure, RunningHttpMockK8sServer};

//! Cloudstep Provisioning - resumable lifecycles for cloud database resources
//!
//! Every invocation performs exactly one unit of work against a remote control
//! plane and returns either a terminal outcome or a continuation context and a
//! delay. The caller hands the context back verbatim on the next invocation;
//! nothing is kept in memory between calls.
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cloudstep_provisioning::config::ControllerConfig;
//! use cloudstep_provisioning::controller::Controller;
//! use cloudstep_provisioning::gateway::{ControlPlaneClient, ControlPlaneGateway};
//! use cloudstep_provisioning::policies::ExportJobPolicy;
//! use cloudstep_provisioning::{Operation, Outcome, RawContext};
//! use cloudstep_models::ExportJobModel;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = ControlPlaneClient::new("https://cloud.example.com", "token")?;
//! let gateway = Arc::new(ControlPlaneGateway::new(client));
//! let policy = ExportJobPolicy::new(gateway, Operation::Create, "Successful");
//! let controller = Controller::new(policy, ControllerConfig::new(std::time::Duration::from_secs(35)));
//!
//! let model: ExportJobModel = serde_json::from_str(r#"{"projectId": "p1", "clusterName": "c1",
//!     "snapshotId": "s1", "exportBucketId": "b1"}"#)?;
//! let mut context = RawContext::new();
//! loop {
//!     match controller.step(&context, &model).await {
//!         Outcome::InProgress { context: next, delay, .. } => {
//!             context = next;
//!             tokio::time::sleep(delay).await;
//!         }
//!         done => {
//!             println!("{:?}", done);
//!             break;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod names;
pub mod types;
pub mod error;
pub mod config;

// Resumption
pub mod context;
pub mod supervisor;
pub mod controller;

// Remote control planes
pub mod gateway;

// Resource families
pub mod policies;
pub mod registry;

pub use types::*;
pub use error::{ContextError, GatewayError, ProvisionError};

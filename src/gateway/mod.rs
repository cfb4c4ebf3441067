//! Cloud provider access
//!
//! This module provides a trait-based abstraction over the provider
//! operations the engine needs: account traffic, instance status, and
//! start/stop commands.
//!
//! ## Design
//!
//! - **Trait-based**: `CloudGateway` allows swapping implementations
//!   (and faking the provider in tests)
//! - **Async**: all operations are async for compatibility with tokio
//! - **Credentials per call**: each monitored target carries its own
//!   account, so credentials travel with every request

pub mod aliyun;
pub mod error;

use async_trait::async_trait;

use crate::config::Credentials;
use crate::{InstanceStatus, TrafficReading};

pub use aliyun::AliyunGateway;
pub use error::{GatewayError, GatewayResult};

/// Provider operations used by the decision engine.
///
/// Implementations must be `Send + Sync` as the gateway is shared
/// behind a reference for the whole run.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Total outbound traffic consumed by the account in the current
    /// billing window.
    async fn query_traffic(&self, credentials: &Credentials) -> GatewayResult<TrafficReading>;

    /// Current lifecycle status of one instance.
    ///
    /// An instance id the provider does not know yields
    /// [`GatewayError::InstanceNotFound`].
    async fn query_instance_status(
        &self,
        credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<InstanceStatus>;

    /// Issue a start command. Completion is not awaited here; callers
    /// poll [`Self::query_instance_status`] to confirm.
    async fn start_instance(
        &self,
        credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<()>;

    /// Issue a stop command.
    async fn stop_instance(
        &self,
        credentials: &Credentials,
        instance_id: &str,
    ) -> GatewayResult<()>;
}

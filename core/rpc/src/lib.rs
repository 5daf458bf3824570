// blockfill/core/rpc/src/lib.rs

//! Remote node access.
//!
//! [`BlockSource`] is what the sync pipeline consumes; [`JsonRpcClient`]
//! implements it over JSON-RPC 2.0 / HTTP.

pub mod client;
pub mod error;
pub mod types;

pub use blockfill_primitives::{BlockPayload, Height};
pub use client::{JsonRpcClient, RpcClientConfig};
pub use error::RpcError;
pub use types::HeightMethod;

use async_trait::async_trait;
use std::sync::Arc;

/// A remote node that can report its tip and serve blocks by height.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Current chain height on the remote node (the sync frontier).
    async fn latest_height(&self) -> Result<Height, RpcError>;

    /// Retrieve the block at `height`.
    async fn fetch_block(&self, height: Height) -> Result<BlockPayload, RpcError>;
}

#[async_trait]
impl<T: BlockSource + ?Sized> BlockSource for Arc<T> {
    async fn latest_height(&self) -> Result<Height, RpcError> {
        (**self).latest_height().await
    }

    async fn fetch_block(&self, height: Height) -> Result<BlockPayload, RpcError> {
        (**self).fetch_block(height).await
    }
}

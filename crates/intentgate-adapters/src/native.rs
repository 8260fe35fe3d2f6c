//! Native capabilities compiled into the binary.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Result;
use crate::traits::{Capability, CapabilityDescriptor};

type Handler = Arc<dyn Fn(Value, Option<String>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A native capability backed by an async closure.
///
/// The closure receives the parameters and the resolved credential, if any.
pub struct FnCapability {
    descriptor: CapabilityDescriptor,
    handler: Handler,
}

impl FnCapability {
    pub fn new<F, Fut>(descriptor: CapabilityDescriptor, handler: F) -> Self
    where
        F: Fn(Value, Option<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            descriptor,
            handler: Arc::new(move |params, credential| Box::pin(handler(params, credential))),
        }
    }
}

#[async_trait]
impl Capability for FnCapability {
    fn descriptor(&self) -> &CapabilityDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, params: Value, credential: Option<&str>) -> Result<Value> {
        (self.handler)(params, credential.map(str::to_owned)).await
    }
}

use malcore::{ClientError, ClientProvider, ExecutionClients, ExecutionContext, ExecutionId, ExecutionLimits, Flow};
use std::sync::Arc;

/// Assembles the clients, limits and logging scope for each execution
#[derive(Clone)]
pub struct ContextBuilder {
    provider: Arc<dyn ClientProvider>,
    limits: ExecutionLimits,
}

impl ContextBuilder {
    pub fn new(provider: Arc<dyn ClientProvider>, limits: ExecutionLimits) -> Self {
        Self { provider, limits }
    }

    pub fn limits(&self) -> &ExecutionLimits {
        &self.limits
    }

    /// Resolve the clients for `flow`. Runs before the execution record
    /// exists, so a provider failure leaves nothing behind.
    pub async fn prepare(&self, flow: &Flow) -> Result<ExecutionClients, ClientError> {
        self.provider.clients_for(flow).await
    }

    pub fn build(&self, flow: &Flow, execution_id: ExecutionId, clients: ExecutionClients) -> ExecutionContext {
        ExecutionContext::new(flow, execution_id, clients, self.limits.clone())
    }
}

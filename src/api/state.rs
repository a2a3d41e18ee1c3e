//! API shared state

use crate::broker::BrokerHandle;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Handle to the broker actor owning all relay state
    pub broker: BrokerHandle,
}

impl ApiState {
    pub fn new(broker: BrokerHandle) -> Self {
        Self { broker }
    }
}

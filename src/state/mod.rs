use crate::gateway::TableGateway;

/// Shared by every handler; cloning is cheap since the gateway holds the
/// backend behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub gateway: TableGateway,
}

impl AppState {
    pub fn new(gateway: TableGateway) -> Self {
        Self { gateway }
    }
}

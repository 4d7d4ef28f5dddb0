use tracing::debug;

use crate::{
    player::{SdkRuntime, SdkSignal},
    spotify::CatalogGateway,
};

/// Brings the Connect runtime up by probing the device list once. The probe
/// fails when the Web API is unreachable or the session is unusable.
pub struct ConnectRuntime {
    catalog: CatalogGateway,
}

impl ConnectRuntime {
    pub fn new(catalog: CatalogGateway) -> Self {
        Self { catalog }
    }
}

impl SdkRuntime for ConnectRuntime {
    fn inject(&self, signal: SdkSignal) {
        let catalog = self.catalog.clone();
        tokio::spawn(async move {
            match catalog.devices().await {
                Ok(devices) => {
                    debug!(count = devices.len(), "connect runtime reachable");
                    signal.ready();
                }
                Err(e) => signal.failed(e.to_string()),
            }
        });
    }
}

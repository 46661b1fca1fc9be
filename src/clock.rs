//! Appliance clock synchronization
//!
//! The appliance has no battery-backed clock; after login the client
//! pushes its own time so certificate checks and log timestamps hold.

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::session::{EventBus, EventKind};
use serde_json::json;
use std::sync::Arc;

pub struct Clock {
    gateway: Arc<Gateway>,
    bus: EventBus,
}

impl Clock {
    pub fn new(gateway: Arc<Gateway>, bus: EventBus) -> Clock {
        Clock { gateway, bus }
    }

    /// Sets the appliance clock to this client's current time.
    pub async fn sync(&self) -> Result<(), GatewayError> {
        self.set_epoch(chrono::Utc::now().timestamp()).await
    }

    /// Sets the appliance clock to `epoch` seconds.
    pub async fn set_epoch(&self, epoch: i64) -> Result<(), GatewayError> {
        let body = json!({"epoch": epoch});
        match self
            .gateway
            .call(ApiMethod::ConfigTime, Verb::Post, Some(body))
            .await
        {
            Ok(_) => {
                self.bus
                    .emit(EventKind::Info, "[clock.sync] appliance clock synchronized");
                Ok(())
            }
            Err(err) => {
                self.bus.report("clock.sync", &err);
                Err(err)
            }
        }
    }
}

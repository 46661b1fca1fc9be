//! Volume password maintenance
//!
//! Adds, changes, and removes passwords on the encrypted volume. The
//! appliance performs the slot operations; nothing key-related happens
//! on this side.

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::session::{EventBus, EventKind};
use serde_json::json;
use std::sync::Arc;

pub struct Luks {
    gateway: Arc<Gateway>,
    bus: EventBus,
}

impl Luks {
    pub fn new(gateway: Arc<Gateway>, bus: EventBus) -> Luks {
        Luks { gateway, bus }
    }

    pub async fn add_password(
        &self,
        volume: &str,
        password: &str,
        new_password: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({"volume": volume, "password": password, "newpassword": new_password});
        self.op(ApiMethod::LuksAdd, "luks.add", "volume password added", body)
            .await
    }

    pub async fn change_password(
        &self,
        volume: &str,
        password: &str,
        new_password: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({"volume": volume, "password": password, "newpassword": new_password});
        self.op(
            ApiMethod::LuksChange,
            "luks.change",
            "volume password changed",
            body,
        )
        .await
    }

    pub async fn remove_password(
        &self,
        volume: &str,
        password: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({"volume": volume, "password": password});
        self.op(
            ApiMethod::LuksRemove,
            "luks.remove",
            "volume password removed",
            body,
        )
        .await
    }

    async fn op(
        &self,
        method: ApiMethod,
        source: &str,
        success: &str,
        body: serde_json::Value,
    ) -> Result<(), GatewayError> {
        match self.gateway.call(method, Verb::Post, Some(body)).await {
            Ok(_) => {
                self.bus
                    .emit(EventKind::Notice, format!("[{source}] {success}"));
                Ok(())
            }
            Err(err) => {
                self.bus.report(source, &err);
                Err(err)
            }
        }
    }
}

//! Cipher and key inventory
//!
//! Caches the appliance's cipher and key catalogs. Both lists prime
//! concurrently; a failed fetch is reported and the cache keeps its
//! previous content, so `prime` always completes.

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::session::{EventBus, EventKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;

/// A cipher the appliance can apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CipherSpec {
    pub name: String,
    pub info: String,
    pub key_format: String,
    pub enc: bool,
    pub dec: bool,
    pub sig: bool,
    #[serde(default)]
    pub otp: bool,
    #[serde(default)]
    pub msg: bool,
    pub ext: String,
}

/// A key stored on the appliance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyInfo {
    pub identifier: String,
    pub key_format: String,
    pub cipher: String,
    pub private: bool,
    pub path: String,
}

impl KeyInfo {
    /// Shape check before the key is referenced in a request.
    pub fn is_usable(&self) -> bool {
        !self.identifier.is_empty() && !self.cipher.is_empty() && !self.path.is_empty()
    }
}

pub struct Keyring {
    gateway: Arc<Gateway>,
    bus: EventBus,
    ciphers: RwLock<Vec<CipherSpec>>,
    keys: RwLock<Vec<KeyInfo>>,
}

impl Keyring {
    pub fn new(gateway: Arc<Gateway>, bus: EventBus) -> Keyring {
        Keyring {
            gateway,
            bus,
            ciphers: RwLock::new(Vec::new()),
            keys: RwLock::new(Vec::new()),
        }
    }

    /// Refreshes both catalogs concurrently. Completes exactly once per
    /// call, whatever the two requests do.
    pub async fn prime(&self) {
        let (ciphers, keys) = futures::join!(self.fetch_ciphers(), self.fetch_keys());
        if let Some(list) = ciphers {
            *self.ciphers.write().await = list;
        }
        if let Some(list) = keys {
            *self.keys.write().await = list;
        }
    }

    pub async fn ciphers(&self) -> Vec<CipherSpec> {
        self.ciphers.read().await.clone()
    }

    pub async fn keys(&self) -> Vec<KeyInfo> {
        self.keys.read().await.clone()
    }

    pub async fn private_keys(&self) -> Vec<KeyInfo> {
        self.keys.read().await.iter().filter(|k| k.private).cloned().collect()
    }

    pub async fn public_keys(&self) -> Vec<KeyInfo> {
        self.keys.read().await.iter().filter(|k| !k.private).cloned().collect()
    }

    pub async fn cipher(&self, name: &str) -> Option<CipherSpec> {
        self.ciphers.read().await.iter().find(|c| c.name == name).cloned()
    }

    /// A key is fit for requests when its shape holds and its cipher is
    /// one the appliance advertised.
    pub async fn validate_key(&self, key: &KeyInfo) -> bool {
        key.is_usable() && self.cipher(&key.cipher).await.is_some()
    }

    /// Starts server-side generation of a key pair; completion shows up
    /// as a `generated` marker in the status log.
    pub async fn generate_key(
        &self,
        identifier: &str,
        cipher: &str,
        key_format: &str,
        email: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "identifier": identifier,
            "key_format": key_format,
            "cipher": cipher,
            "email": email,
        });
        match self
            .gateway
            .call(ApiMethod::CryptoGenKey, Verb::Post, Some(body))
            .await
        {
            Ok(_) => {
                self.bus
                    .emit(EventKind::Info, "[keyring.generate] key generation started");
                Ok(())
            }
            Err(err) => {
                self.bus.report("keyring.generate", &err);
                Err(err)
            }
        }
    }

    /// Imports key material onto the appliance.
    pub async fn upload_key(&self, key: &KeyInfo, data: &str) -> Result<(), GatewayError> {
        let body = json!({"key": key, "data": data});
        match self
            .gateway
            .call(ApiMethod::CryptoUploadKey, Verb::Post, Some(body))
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                self.bus.report("keyring.upload", &err);
                Err(err)
            }
        }
    }

    /// Fetches the descriptive text for the key stored at `path`.
    pub async fn key_info(&self, path: &str) -> Result<String, GatewayError> {
        match self
            .gateway
            .call(ApiMethod::CryptoKeyInfo, Verb::Post, Some(json!({"path": path})))
            .await
        {
            Ok(payload) => payload
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| {
                    let err = GatewayError::malformed("key info", "not text");
                    self.bus.report("keyring.info", &err);
                    err
                }),
            Err(err) => {
                self.bus.report("keyring.info", &err);
                Err(err)
            }
        }
    }

    async fn fetch_ciphers(&self) -> Option<Vec<CipherSpec>> {
        match self
            .gateway
            .call(ApiMethod::CryptoCiphers, Verb::Get, None)
            .await
        {
            Ok(payload) => decode_catalog::<CipherSpec>(payload).or_else(|| {
                self.bus.report(
                    "keyring.ciphers",
                    &GatewayError::malformed("cipher list", "not an array"),
                );
                None
            }),
            Err(err) => {
                self.bus.report("keyring.ciphers", &err);
                None
            }
        }
    }

    async fn fetch_keys(&self) -> Option<Vec<KeyInfo>> {
        let body = json!({"public": true, "private": true});
        match self
            .gateway
            .call(ApiMethod::CryptoKeys, Verb::Post, Some(body))
            .await
        {
            Ok(payload) => decode_catalog::<KeyInfo>(payload)
                .map(|keys| keys.into_iter().filter(KeyInfo::is_usable).collect())
                .or_else(|| {
                    self.bus.report(
                        "keyring.keys",
                        &GatewayError::malformed("key list", "not an array"),
                    );
                    None
                }),
            Err(err) => {
                self.bus.report("keyring.keys", &err);
                None
            }
        }
    }
}

/// Decodes a catalog array, skipping entries that do not match the
/// expected shape. Returns `None` when the payload is not an array.
fn decode_catalog<T: serde::de::DeserializeOwned>(payload: Value) -> Option<Vec<T>> {
    match payload {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    }
}

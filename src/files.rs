//! Remote file operations
//!
//! Thin request/decode glue over the gateway; the appliance does the
//! actual work. Long-running jobs (encrypt, decrypt, sign) only start
//! here, their completion surfaces through the status poller.

use crate::gateway::{ApiMethod, Gateway, GatewayError, Verb};
use crate::keyring::KeyInfo;
use crate::session::EventBus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// One entry of a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct Inode {
    pub name: String,
    pub dir: bool,
    pub size: u64,
    pub mtime: i64,
    #[serde(default)]
    pub key_path: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub key: Option<KeyInfo>,
    #[serde(default)]
    pub sha256: String,
}

/// Reply to `file/list`.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing {
    pub total_space: u64,
    pub free_space: u64,
    #[serde(default)]
    pub inodes: Vec<Inode>,
}

/// Arguments for `file/encrypt`. Unused fields stay empty strings, the
/// appliance expects every key to be present.
#[derive(Debug, Clone, Serialize)]
pub struct EncryptRequest {
    pub src: String,
    pub cipher: String,
    pub wipe_src: bool,
    pub sign: bool,
    pub password: String,
    pub key: String,
    pub sig_key: String,
}

/// Arguments for `file/decrypt`.
#[derive(Debug, Clone, Serialize)]
pub struct DecryptRequest {
    pub src: String,
    pub password: String,
    pub verify: bool,
    pub key: String,
    pub sig_key: String,
    pub cipher: String,
}

/// Arguments for `file/sign`.
#[derive(Debug, Clone, Serialize)]
pub struct SignRequest {
    pub src: String,
    pub cipher: String,
    pub password: String,
    pub key: String,
}

/// Arguments for `file/verify`.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyRequest {
    pub src: String,
    pub sig: String,
    pub key: String,
    pub cipher: String,
}

pub struct Files {
    gateway: Arc<Gateway>,
    bus: EventBus,
}

impl Files {
    pub fn new(gateway: Arc<Gateway>, bus: EventBus) -> Files {
        Files { gateway, bus }
    }

    /// Lists `path`. A rejection naming a missing path retries once from
    /// the volume root, so a stale working directory recovers on its own.
    pub async fn list(&self, path: &str, sha256: bool) -> Result<Listing, GatewayError> {
        match self.list_once(path, sha256).await {
            Ok(listing) => Ok(listing),
            Err(err) => {
                self.bus.report("files.list", &err);
                let missing_path = matches!(
                    &err,
                    GatewayError::Rejected { message, .. }
                        if message.contains("no such file or directory")
                );
                if missing_path && path != "/" {
                    self.list_once("/", sha256).await.map_err(|retry_err| {
                        self.bus.report("files.list", &retry_err);
                        retry_err
                    })
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn list_once(&self, path: &str, sha256: bool) -> Result<Listing, GatewayError> {
        let body = json!({"path": path, "sha256": sha256});
        let payload = self
            .gateway
            .call(ApiMethod::FileList, Verb::Post, Some(body))
            .await?;
        serde_json::from_value(payload).map_err(|e| GatewayError::malformed("file listing", e))
    }

    pub async fn move_paths(&self, src: &[String], dst: &str) -> Result<(), GatewayError> {
        self.src_dst_op(ApiMethod::FileMove, "files.move", src, dst).await
    }

    pub async fn copy_paths(&self, src: &[String], dst: &str) -> Result<(), GatewayError> {
        self.src_dst_op(ApiMethod::FileCopy, "files.copy", src, dst).await
    }

    /// Packs `src` into the archive `dst`; format follows the extension.
    pub async fn compress(&self, src: &[String], dst: &str) -> Result<(), GatewayError> {
        self.src_dst_op(ApiMethod::FileCompress, "files.compress", src, dst)
            .await
    }

    /// Unpacks the archive `src` into the directory `dst`.
    pub async fn extract(&self, src: &[String], dst: &str) -> Result<(), GatewayError> {
        self.src_dst_op(ApiMethod::FileExtract, "files.extract", src, dst)
            .await
    }

    pub async fn delete(&self, paths: &[String]) -> Result<(), GatewayError> {
        let res = self
            .gateway
            .call(ApiMethod::FileDelete, Verb::Post, Some(json!({"path": paths})))
            .await;
        self.done("files.delete", res)
    }

    pub async fn mkdir(&self, paths: &[String]) -> Result<(), GatewayError> {
        let res = self
            .gateway
            .call(ApiMethod::FileMkdir, Verb::Post, Some(json!({"path": paths})))
            .await;
        self.done("files.mkdir", res)
    }

    /// Creates a text file in place.
    pub async fn new_file(&self, path: &str, contents: &str) -> Result<(), GatewayError> {
        let body = json!({"path": path, "contents": contents});
        let res = self
            .gateway
            .call(ApiMethod::FileNew, Verb::Post, Some(body))
            .await;
        self.done("files.new", res)
    }

    pub async fn encrypt(&self, req: &EncryptRequest) -> Result<(), GatewayError> {
        self.job_op(ApiMethod::FileEncrypt, "files.encrypt", req).await
    }

    pub async fn decrypt(&self, req: &DecryptRequest) -> Result<(), GatewayError> {
        self.job_op(ApiMethod::FileDecrypt, "files.decrypt", req).await
    }

    pub async fn sign(&self, req: &SignRequest) -> Result<(), GatewayError> {
        self.job_op(ApiMethod::FileSign, "files.sign", req).await
    }

    pub async fn verify(&self, req: &VerifyRequest) -> Result<(), GatewayError> {
        self.job_op(ApiMethod::FileVerify, "files.verify", req).await
    }

    /// Sends `local` as the raw request body; the three custom headers
    /// carry everything else. Returns the byte count on success.
    pub async fn upload(
        &self,
        local: &Path,
        dest: &str,
        overwrite: bool,
    ) -> Result<u64, GatewayError> {
        let bytes = match tokio::fs::read(local).await {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = GatewayError::Client(anyhow::anyhow!(
                    "reading {}: {e}",
                    local.display()
                ));
                self.bus.report("files.upload", &err);
                return Err(err);
            }
        };
        let size = bytes.len() as u64;
        match self.gateway.upload(dest, overwrite, bytes).await {
            Ok(()) => Ok(size),
            Err(err) => {
                self.bus.report("files.upload", &err);
                Err(err)
            }
        }
    }

    /// Two-phase fetch: obtain a one-time id for `remote`, then stream
    /// the bytes into `local`. Returns the byte count.
    pub async fn download(&self, remote: &str, local: &Path) -> Result<u64, GatewayError> {
        let res = self.download_inner(remote, local).await;
        if let Err(err) = &res {
            self.bus.report("files.download", err);
        }
        res
    }

    async fn download_inner(&self, remote: &str, local: &Path) -> Result<u64, GatewayError> {
        let payload = self
            .gateway
            .call(ApiMethod::FileDownload, Verb::Post, Some(json!({"path": remote})))
            .await?;
        let id = payload
            .as_str()
            .ok_or_else(|| GatewayError::malformed("download handshake", "id is not a string"))?
            .to_string();

        let mut reply = self.gateway.download_stream(&id).await?;
        let mut file = tokio::fs::File::create(local).await.map_err(|e| {
            GatewayError::Client(anyhow::anyhow!("creating {}: {e}", local.display()))
        })?;

        let mut written = 0u64;
        while let Some(chunk) = reply.chunk().await.map_err(GatewayError::from_network_error)? {
            file.write_all(&chunk).await.map_err(|e| {
                GatewayError::Client(anyhow::anyhow!("writing {}: {e}", local.display()))
            })?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| {
            GatewayError::Client(anyhow::anyhow!("writing {}: {e}", local.display()))
        })?;
        Ok(written)
    }

    async fn src_dst_op(
        &self,
        method: ApiMethod,
        source: &str,
        src: &[String],
        dst: &str,
    ) -> Result<(), GatewayError> {
        let body = json!({"src": src, "dst": dst});
        let res = self.gateway.call(method, Verb::Post, Some(body)).await;
        self.done(source, res)
    }

    async fn job_op<R: Serialize>(
        &self,
        method: ApiMethod,
        source: &str,
        req: &R,
    ) -> Result<(), GatewayError> {
        let body = serde_json::to_value(req)
            .map_err(|e| GatewayError::malformed("request body", e))?;
        let res = self.gateway.call(method, Verb::Post, Some(body)).await;
        self.done(source, res)
    }

    fn done(&self, source: &str, res: Result<Value, GatewayError>) -> Result<(), GatewayError> {
        match res {
            Ok(_) => Ok(()),
            Err(err) => {
                self.bus.report(source, &err);
                Err(err)
            }
        }
    }
}

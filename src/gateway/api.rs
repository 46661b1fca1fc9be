//! Appliance endpoint table
//!
//! The complete URL map of the JSON API, one entry per operation.
//! Modules never build request paths by hand.

use std::fmt;

/// Path prefix every endpoint lives under.
pub const API_PREFIX: &str = "/api/";

/// HTTP verb for an exchange. The appliance uses no others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Post,
}

/// Every operation the appliance exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMethod {
    AuthLogin,
    AuthRefresh,
    AuthLogout,
    AuthPoweroff,
    LuksAdd,
    LuksChange,
    LuksRemove,
    FileList,
    FileMove,
    FileCopy,
    FileMkdir,
    FileDelete,
    FileCompress,
    FileExtract,
    FileNew,
    FileUpload,
    FileDownload,
    FileEncrypt,
    FileDecrypt,
    FileSign,
    FileVerify,
    CryptoCiphers,
    CryptoKeys,
    CryptoGenKey,
    CryptoUploadKey,
    CryptoKeyInfo,
    ConfigTime,
    StatusVersion,
    StatusRunning,
    MsgSend,
    MsgHistory,
    MsgRegister,
}

impl ApiMethod {
    /// Endpoint path relative to [`API_PREFIX`].
    pub fn path(self) -> &'static str {
        match self {
            ApiMethod::AuthLogin => "auth/login",
            ApiMethod::AuthRefresh => "auth/refresh",
            ApiMethod::AuthLogout => "auth/logout",
            ApiMethod::AuthPoweroff => "auth/poweroff",
            ApiMethod::LuksAdd => "luks/add",
            ApiMethod::LuksChange => "luks/change",
            ApiMethod::LuksRemove => "luks/remove",
            ApiMethod::FileList => "file/list",
            ApiMethod::FileMove => "file/move",
            ApiMethod::FileCopy => "file/copy",
            ApiMethod::FileMkdir => "file/mkdir",
            ApiMethod::FileDelete => "file/delete",
            ApiMethod::FileCompress => "file/compress",
            ApiMethod::FileExtract => "file/extract",
            ApiMethod::FileNew => "file/new",
            ApiMethod::FileUpload => "file/upload",
            ApiMethod::FileDownload => "file/download",
            ApiMethod::FileEncrypt => "file/encrypt",
            ApiMethod::FileDecrypt => "file/decrypt",
            ApiMethod::FileSign => "file/sign",
            ApiMethod::FileVerify => "file/verify",
            ApiMethod::CryptoCiphers => "crypto/ciphers",
            ApiMethod::CryptoKeys => "crypto/keys",
            ApiMethod::CryptoGenKey => "crypto/gen_key",
            ApiMethod::CryptoUploadKey => "crypto/upload_key",
            ApiMethod::CryptoKeyInfo => "crypto/key_info",
            ApiMethod::ConfigTime => "config/time",
            ApiMethod::StatusVersion => "status/version",
            ApiMethod::StatusRunning => "status/running",
            ApiMethod::MsgSend => "msg/send",
            ApiMethod::MsgHistory => "msg/history",
            ApiMethod::MsgRegister => "msg/register",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CardsError {
    #[error("invalid contract address: {0}")]
    InvalidContractAddress(String),

    #[error("invalid token range: {0}")]
    InvalidRange(String),

    #[error("invalid batch size: {0} (must be greater than zero)")]
    InvalidBatchSize(u64),

    #[error("no RPC endpoint configured: set BUTERIN_CARDS_RPC_URL or INFURA_PROJECT_ID")]
    #[diagnostic(help("put the variable in a .env file next to the binary or export it"))]
    MissingEndpoint,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("RPC request failed: {0}")]
    RpcHttp(String),

    #[error("RPC returned status {status}: {message}")]
    RpcStatus { status: u16, message: String },

    #[error("RPC call failed: {0}")]
    RpcCall(String),

    #[error("malformed ABI response: {0}")]
    AbiDecode(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("CSV export failed: {0}")]
    Csv(String),

    #[error("RPC client not configured for this command")]
    RpcUnavailable,
}

//! Node access.
//!
//! [`BlockSource`] is the only way the scanners reach the chain, so tests can
//! swap the RPC client for an in-memory source.

use bitcoin::BlockHash;
use bitcoincore_rpc::{
    jsonrpc::{self, simple_http::SimpleHttpTransport},
    Client as RpcClient, RpcApi,
};
use chainwalk_core::Block;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{config::Config, error::SourceError, shutdown::Shutdown};

/// Chain state captured once at the start of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub tip_height: u64,
    pub pruned: bool,
    /// Lowest height with block data, for pruned nodes.
    pub prune_height: Option<u64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub chain: String,
    pub difficulty: f64,
    pub blocks: u64,
    pub network_hash_ps: f64,
}

pub trait BlockSource {
    fn tip_height(&self) -> Result<u64, SourceError>;

    fn chain_info(&self) -> Result<ChainInfo, SourceError>;

    /// Fetches heights `start..=end`, `start` clamped to 1.
    ///
    /// Heights whose individual calls fail are left out. Losing the node
    /// aborts the whole range with [`SourceError::Unavailable`].
    fn fetch_block_range(
        &self,
        start: u64,
        end: u64,
        shutdown: &Shutdown,
    ) -> Result<Vec<Block>, SourceError>;

    /// Best effort; `None` when the node does not answer.
    fn network_stats(&self) -> Option<NetworkStats>;

    fn fetch_block_by_hash(&self, hash: &str) -> Result<Block, SourceError>;
}

/// Subset of `getblockchaininfo`, read loosely so newer node versions that
/// reshape unrelated fields still parse.
#[derive(Debug, Deserialize)]
struct BlockchainInfo {
    chain: String,
    blocks: u64,
    #[serde(default)]
    difficulty: f64,
    #[serde(default)]
    pruned: bool,
    #[serde(default)]
    pruneheight: Option<u64>,
}

pub struct RpcBlockSource {
    client: RpcClient,
}

impl RpcBlockSource {
    pub fn new(config: &Config) -> Result<Self, SourceError> {
        let transport = SimpleHttpTransport::builder()
            .url(&config.rpc_url)
            .map_err(|e| SourceError::Unavailable(format!("bad rpc url {}: {e}", config.rpc_url)))?
            .auth(config.rpc_user.as_str(), Some(config.rpc_pass.as_str()))
            .timeout(config.rpc_timeout)
            .build();
        let client = RpcClient::from_jsonrpc(jsonrpc::Client::with_transport(transport));
        Ok(RpcBlockSource { client })
    }

    fn blockchain_info(&self) -> Result<BlockchainInfo, SourceError> {
        Ok(self.client.call("getblockchaininfo", &[])?)
    }

    fn fetch_height(&self, height: u64) -> Result<Block, bitcoincore_rpc::Error> {
        let hash = self.client.get_block_hash(height)?;
        let block = self.client.get_block(&hash)?;
        Ok(Block::from_consensus(height, &block))
    }
}

/// Transport failures mean the node itself is gone. Anything else is specific
/// to the request.
fn is_transport_error(err: &bitcoincore_rpc::Error) -> bool {
    matches!(
        err,
        bitcoincore_rpc::Error::JsonRpc(jsonrpc::Error::Transport(_))
    )
}

impl BlockSource for RpcBlockSource {
    fn tip_height(&self) -> Result<u64, SourceError> {
        Ok(self.client.get_block_count()?)
    }

    fn chain_info(&self) -> Result<ChainInfo, SourceError> {
        let info = self.blockchain_info()?;
        Ok(ChainInfo {
            tip_height: info.blocks,
            pruned: info.pruned,
            prune_height: info.pruneheight.filter(|_| info.pruned),
        })
    }

    fn fetch_block_range(
        &self,
        start: u64,
        end: u64,
        shutdown: &Shutdown,
    ) -> Result<Vec<Block>, SourceError> {
        let start = start.max(1);
        if end < start {
            return Ok(Vec::new());
        }

        let mut blocks = Vec::with_capacity((end - start + 1) as usize);
        for height in start..=end {
            if shutdown.is_triggered() {
                return Err(SourceError::Cancelled);
            }
            match self.fetch_height(height) {
                Ok(block) => {
                    debug!(height, hash = %block.hash, tx_count = block.tx_count, "fetched block");
                    blocks.push(block);
                }
                Err(err) if is_transport_error(&err) => {
                    return Err(SourceError::Unavailable(format!(
                        "lost node at height {height}: {err}"
                    )));
                }
                Err(err) => {
                    let err = SourceError::Rpc {
                        height,
                        message: err.to_string(),
                    };
                    warn!("skipping block: {err}");
                }
            }
        }
        Ok(blocks)
    }

    fn network_stats(&self) -> Option<NetworkStats> {
        let info = match self.blockchain_info() {
            Ok(info) => info,
            Err(err) => {
                warn!("network stats unavailable: {err}");
                return None;
            }
        };
        let network_hash_ps = self
            .client
            .get_network_hash_ps(None, None)
            .map_err(|err| warn!("getnetworkhashps failed: {err}"))
            .unwrap_or_default();
        Some(NetworkStats {
            chain: info.chain,
            difficulty: info.difficulty,
            blocks: info.blocks,
            network_hash_ps,
        })
    }

    fn fetch_block_by_hash(&self, hash: &str) -> Result<Block, SourceError> {
        let block_hash: BlockHash = hash.trim().parse().map_err(|e| SourceError::Rpc {
            height: 0,
            message: format!("invalid block hash {hash}: {e}"),
        })?;
        let rpc_err = |err: bitcoincore_rpc::Error| {
            if is_transport_error(&err) {
                SourceError::Unavailable(err.to_string())
            } else {
                SourceError::Rpc {
                    height: 0,
                    message: format!("{block_hash}: {err}"),
                }
            }
        };
        let header = self.client.get_block_header_info(&block_hash).map_err(rpc_err)?;
        let block = self.client.get_block(&block_hash).map_err(rpc_err)?;
        Ok(Block::from_consensus(header.height as u64, &block))
    }
}

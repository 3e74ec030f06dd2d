use alloy_eips::BlockNumberOrTag;
use alloy_primitives::hex;
use alloy_provider::Provider;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::common::NodeInfo;
use crate::models::errors::ChainError;

/// Client family of the attached node, chosen once at startup. Each kind knows how
/// to obtain the node identity used as the header fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Geth,
    Parity,
    Infura,
    Ganache,
    Generic,
}

impl NodeKind {
    pub fn from_url(rpc_url: &str) -> Option<Self> {
        if rpc_url.contains("infura") {
            Some(NodeKind::Infura)
        } else if rpc_url.contains("127.0.0.1") || rpc_url.contains("localhost") {
            Some(NodeKind::Ganache)
        } else {
            None
        }
    }

    pub fn from_modules(modules: &HashMap<String, String>) -> Self {
        if modules.contains_key("admin") {
            NodeKind::Geth
        } else if modules.keys().any(|module| module.starts_with("parity")) {
            NodeKind::Parity
        } else {
            NodeKind::Generic
        }
    }

    pub async fn detect<P: Provider>(provider: &P, rpc_url: &str) -> Self {
        if let Some(kind) = Self::from_url(rpc_url) {
            return kind;
        }

        match provider
            .raw_request::<_, HashMap<String, String>>("rpc_modules".into(), ())
            .await
        {
            Ok(modules) => Self::from_modules(&modules),
            Err(e) => {
                warn!("rpc_modules probe failed, treating node as generic: {}", e);
                NodeKind::Generic
            }
        }
    }

    // (id, client name)
    async fn identity<P: Provider>(
        &self,
        provider: &P,
        network_id: &str,
        genesis_block: &str,
    ) -> Result<(String, String), ChainError> {
        match self {
            NodeKind::Infura => Ok(("infura".to_string(), "infura".to_string())),
            NodeKind::Ganache => Ok(("ganache".to_string(), "ganache".to_string())),
            NodeKind::Geth => {
                let info: serde_json::Value = provider
                    .raw_request("admin_nodeInfo".into(), ())
                    .await
                    .map_err(|e| ChainError::rpc("admin_nodeInfo", e))?;
                let field = |name: &str| {
                    info.get(name)
                        .and_then(|value| value.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                Ok((field("id"), field("name")))
            }
            NodeKind::Parity => {
                let enode: String = provider
                    .raw_request("parity_enode".into(), ())
                    .await
                    .map_err(|e| ChainError::rpc("parity_enode", e))?;
                let client_name = client_version(provider).await?;
                Ok((
                    parse_enode_id(&enode).unwrap_or_default().to_string(),
                    client_name,
                ))
            }
            NodeKind::Generic => {
                let client_name = client_version(provider).await?;
                Ok((format!("{network_id}:{genesis_block}"), client_name))
            }
        }
    }
}

/// Extracts the node id from an `enode://<id>@<host>` URL.
pub fn parse_enode_id(enode_url: &str) -> Option<&str> {
    let rest = enode_url.strip_prefix("enode://")?;
    let (id, host) = rest.rsplit_once('@')?;
    if id.is_empty() || host.is_empty() {
        return None;
    }
    Some(id)
}

pub async fn detect_node<P: Provider>(provider: &P, rpc_url: &str) -> Result<NodeInfo, ChainError> {
    let kind = NodeKind::detect(provider, rpc_url).await;

    let network_id: String = provider
        .raw_request("net_version".into(), ())
        .await
        .map_err(|e| ChainError::rpc("net_version", e))?;

    let genesis = provider
        .get_block_by_number(BlockNumberOrTag::Number(0))
        .await
        .map_err(|e| ChainError::rpc("eth_getBlockByNumber", e))?
        .ok_or(ChainError::MissingHeader { block_number: 0 })?;
    let genesis_block = hex::encode_prefixed(genesis.header.hash);

    let (id, client_name) = kind.identity(provider, &network_id, &genesis_block).await?;
    info!(
        "Detected {:?} node {} (client {}, network {})",
        kind, id, client_name, network_id
    );

    Ok(NodeInfo {
        id,
        client_name,
        network_id,
        genesis_block,
    })
}

async fn client_version<P: Provider>(provider: &P) -> Result<String, ChainError> {
    provider
        .get_client_version()
        .await
        .map_err(|e| ChainError::rpc("web3_clientVersion", e))
}

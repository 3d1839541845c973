//! Local gateway probing and document URL construction.
//!
//! Documents live in one flat content archive of `<doi>.pdf` files served
//! over IPFS. A local daemon's gateway serves them with no meaningful rate
//! limit; the public `dweb.link` gateway is metered. The probe decides once
//! per batch which one to use, and with it the batch concurrency policy.

use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::config::GatewayConfig;
use crate::utils::HttpClient;

/// Content archive holding the `<doi>.pdf` tree.
pub const ARCHIVE_CID: &str = "bafyb4iee27p2wdqsorvj7gquitwuti3sfeepdvx2p3feao2dqri37fm3yy";

const PROBE_TIMEOUT: Duration = Duration::from_millis(2_500);

/// Reachability probe for the local gateway.
#[derive(Debug, Clone)]
pub struct GatewayProbe {
    client: HttpClient,
    api_addr: String,
}

impl GatewayProbe {
    pub fn new(client: HttpClient, config: &GatewayConfig) -> Self {
        Self {
            client,
            api_addr: config.api_addr.clone(),
        }
    }

    /// Whether the local gateway is usable.
    ///
    /// The daemon control endpoint must answer within the probe timeout and
    /// report at least one connected peer; a daemon with zero peers cannot
    /// fetch archive blocks and counts as unreachable. Every failure path
    /// (connect error, timeout, bad status, undecodable body) is "no".
    pub async fn probe(&self) -> bool {
        let url = format!(
            "{}/api/v0/swarm/peers",
            self.api_addr.trim_end_matches('/')
        );

        let response = match self.client.post(&url).timeout(PROBE_TIMEOUT).send().await {
            Ok(response) => response,
            Err(err) => {
                tracing::debug!(error = %err, "local gateway probe failed");
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::debug!(status = %response.status(), "local gateway probe rejected");
            return false;
        }

        match response.json::<SwarmPeers>().await {
            Ok(swarm) => !swarm.peers.is_empty(),
            Err(err) => {
                tracing::debug!(error = %err, "local gateway probe returned an unexpected body");
                false
            }
        }
    }
}

/// `swarm/peers` control response (the slice of it we read)
#[derive(Debug, Deserialize)]
struct SwarmPeers {
    #[serde(rename = "Peers", default)]
    peers: Vec<serde_json::Value>,
}

/// Build the document URL for a DOI against the given gateway base.
///
/// The DOI is percent-encoded twice: the gateway decodes the path once, and
/// the stored file name keeps the single-encoded form, so `10.1037/a0023781`
/// must arrive as `10.1037%252Fa0023781.pdf`. Single encoding resolves to a
/// nonexistent subdirectory instead of the file.
pub fn build_document_url(doi: &str, gateway_base: &str) -> Option<Url> {
    let base = Url::parse(gateway_base).ok()?;
    let host = base.host_str()?;
    let authority = match base.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };

    let encoded = urlencoding::encode(doi).into_owned();
    let encoded = urlencoding::encode(&encoded).into_owned();

    Url::parse(&format!(
        "{}://{}.ipfs.{}/{}.pdf",
        base.scheme(),
        ARCHIVE_CID,
        authority,
        encoded
    ))
    .ok()
}

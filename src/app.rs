//! Service clients wired from one resolved [`Config`].

use crate::analysis::AnalysisClient;
use crate::config::Config;
use crate::metadata::ContractMetadataClient;
use crate::registry::{RegistryClient, Transaction};
use crate::session::AnalysisSession;
use crate::signer::SigningClient;

/// Every backend the client talks to.
pub struct App {
    pub config: Config,
    pub registry: RegistryClient,
    pub analyzer: AnalysisClient,
    pub metadata: ContractMetadataClient,
    pub signer: SigningClient,
}

impl App {
    pub fn new(config: Config) -> Self {
        let timeout = config.http_timeout;
        Self {
            registry: RegistryClient::new(&config.registry.base_url, timeout),
            analyzer: AnalysisClient::new(&config.analyzer.base_url, timeout),
            metadata: ContractMetadataClient::new(
                &config.etherscan.api_url,
                config.etherscan.api_key.clone(),
                timeout,
            ),
            signer: SigningClient::new(
                &config.signer.base_url,
                &config.signer.safe_app_url,
                &config.signer.network_prefix,
                timeout,
            ),
            config,
        }
    }

    pub fn risk_session(&self, safe_address: &str, tx: Transaction) -> AnalysisSession {
        AnalysisSession::risk_detection(safe_address, tx)
            .with_idle_timeout(self.config.analyzer.stream_idle_timeout)
    }

    pub fn intent_session(&self, safe_address: &str, tx: Transaction) -> AnalysisSession {
        AnalysisSession::intent_match(safe_address, tx)
            .with_idle_timeout(self.config.analyzer.stream_idle_timeout)
    }
}

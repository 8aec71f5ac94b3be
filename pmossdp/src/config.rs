//! Configuration de la session SSDP
//!
//! Les valeurs absentes du fichier YAML reçoivent leurs défauts champ par
//! champ : un fichier partiel est une configuration valide.

use serde::{Deserialize, Serialize};

use crate::SSDP_PORT;
use crate::error::SsdpError;
use crate::session::SsdpHeader;

fn default_port() -> u16 {
    SSDP_PORT
}

/// Configuration d'une [`crate::SsdpSession`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SsdpConfig {
    /// Port d'écoute et de destination multicast (1900 par convention)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Répondre en unicast aux M-SEARCH dont le ST correspond au service
    #[serde(default)]
    pub respond_to_msearch: bool,

    /// Identité du service local
    #[serde(default)]
    pub header: SsdpHeader,
}

impl Default for SsdpConfig {
    fn default() -> Self {
        Self {
            port: SSDP_PORT,
            respond_to_msearch: false,
            header: SsdpHeader::default(),
        }
    }
}

impl SsdpConfig {
    /// Charge la configuration depuis un fichier YAML.
    pub fn from_yaml_file(path: &str) -> Result<Self, SsdpError> {
        let text =
            std::fs::read_to_string(path).map_err(|e| SsdpError::ConfigRead(path.to_string(), e))?;
        Self::from_yaml(&text)
    }

    /// Analyse une configuration YAML en mémoire.
    pub fn from_yaml(text: &str) -> Result<Self, SsdpError> {
        Ok(serde_yaml::from_str(text)?)
    }
}

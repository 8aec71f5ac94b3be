//! # pmossdp - Simple Service Discovery Protocol
//!
//! Ce crate implémente la découverte SSDP (le mécanisme de découverte
//! d'UPnP sur UDP multicast) : annonce périodique d'un service local,
//! recherche active des services du réseau, et décodage des annonces et
//! réponses des pairs.
//!
//! ## Fonctionnalités
//!
//! - ✅ Envoi de M-SEARCH multicast, une émission par interface IPv4
//! - ✅ Envoi de NOTIFY alive/byebye avec LOCATION par interface
//! - ✅ Réponse unicast aux M-SEARCH (opt-in)
//! - ✅ Décodage tolérant ligne à ligne des messages entrants
//! - ✅ Réception non bloquante pilotée par poll
//!
//! ## Architecture
//!
//! - [`SsdpSession`] : orchestration (sockets, interfaces, template, handler)
//! - [`message`] : modèle de message et codec filaire
//! - [`transport`] : sockets multicast par interface
//! - [`interface`] : énumération des interfaces IPv4
//!
//! ## Constantes SSDP
//!
//! - **Adresse multicast** : 239.255.255.250, port conventionnel 1900
//! - **Max-Age annoncé** : 120 secondes

use std::net::Ipv4Addr;

pub mod config;
pub mod error;
pub mod interface;
pub mod message;
pub mod session;
pub mod transport;

pub use config::SsdpConfig;
pub use error::SsdpError;
pub use interface::{MAX_INTERFACES, SsdpInterface};
pub use message::{
    MAX_FIELD_LEN, SsdpMessage, SsdpMethod, decode, encode_byebye, encode_msearch, encode_notify,
    encode_response,
};
pub use session::{SsdpHeader, SsdpLocation, SsdpSession};
pub use transport::{SsdpReceiver, send_from_interface};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP conventionnel
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité annoncée dans CACHE-CONTROL (en secondes)
pub const CACHE_MAX_AGE: u32 = 120;

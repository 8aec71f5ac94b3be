//! Énumération des interfaces réseau IPv4
//!
//! UPnP impose d'émettre les annonces multicast depuis l'adresse unicast de
//! chaque interface (et non depuis un socket wildcard), sans quoi certains
//! routeurs ne propagent pas le hello. Ce module fournit la liste des
//! interfaces utilisables comme adresses source.

use std::net::Ipv4Addr;

use get_if_addrs::{IfAddr, get_if_addrs};
use tracing::{debug, warn};

use crate::error::SsdpError;

/// Nombre maximum d'interfaces retenues par énumération
pub const MAX_INTERFACES: usize = 16;

/// Interface réseau locale utilisable comme source multicast
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpInterface {
    /// Nom de l'interface (ex: "eth0", "wlan0")
    pub name: String,

    /// Adresse IPv4 de l'interface
    pub addr: Ipv4Addr,

    /// Masque de sous-réseau associé
    pub netmask: Ipv4Addr,
}

impl SsdpInterface {
    /// Liste les interfaces IPv4 de la machine, bornée par [`MAX_INTERFACES`].
    ///
    /// Les entrées non-IPv4 sont ignorées silencieusement. La liste est
    /// reconstruite entièrement à chaque appel ; les interfaces peuvent avoir
    /// changé depuis la dernière utilisation.
    ///
    /// # Returns
    ///
    /// La liste ordonnée des interfaces, ou [`SsdpError::Enumeration`] si la
    /// requête au système échoue.
    pub fn enumerate() -> Result<Vec<SsdpInterface>, SsdpError> {
        let interfaces = get_if_addrs().map_err(SsdpError::Enumeration)?;

        Ok(collect(interfaces.into_iter().filter_map(|iface| {
            match iface.addr {
                IfAddr::V4(v4) => Some((iface.name, v4.ip, v4.netmask)),
                // IPv6 hors périmètre
                IfAddr::V6(_) => None,
            }
        })))
    }

    /// Vérifie si `addr` appartient au sous-réseau de cette interface.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let mask = u32::from(self.netmask);
        (u32::from(self.addr) & mask) == (u32::from(addr) & mask)
    }
}

/// Construit la liste bornée à partir des entrées brutes.
///
/// Une interface multi-adresses ne produit qu'un enregistrement (la première
/// adresse gagne). Au-delà de [`MAX_INTERFACES`], les entrées sont comptées et
/// signalées en debug mais pas retenues ; ce n'est pas une erreur.
fn collect<I>(raw: I) -> Vec<SsdpInterface>
where
    I: Iterator<Item = (String, Ipv4Addr, Ipv4Addr)>,
{
    let mut result: Vec<SsdpInterface> = Vec::new();
    let mut dropped = 0usize;

    for (name, addr, netmask) in raw {
        if result.iter().any(|iface| iface.name == name) {
            debug!("interface {} already listed, keeping first address", name);
            continue;
        }

        if result.len() >= MAX_INTERFACES {
            dropped += 1;
            debug!("interface over capacity: {} : {}", name, addr);
            continue;
        }

        result.push(SsdpInterface {
            name,
            addr,
            netmask,
        });
    }

    if dropped > 0 {
        warn!(
            "the number of network interfaces is over the max size {} ({} dropped)",
            MAX_INTERFACES, dropped
        );
    }

    result
}

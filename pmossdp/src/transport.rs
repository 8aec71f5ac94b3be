//! Transport UDP multicast par interface
//!
//! Deux chemins distincts :
//!
//! - émission : un socket éphémère par envoi, lié à l'adresse unicast de
//!   l'interface source, loopback multicast désactivé, fermé avant le retour
//!   quel que soit le chemin de sortie ;
//! - réception : un socket longue durée non bloquant, lié à l'adresse
//!   wildcard, membre du groupe multicast, partageable entre processus
//!   (SO_REUSEADDR).

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use crate::error::SsdpError;
use crate::interface::SsdpInterface;

/// Envoie un datagramme vers `group:port` depuis l'adresse d'une interface.
///
/// Le socket est créé, lié à `iface.addr` (port source éphémère), utilisé
/// pour un unique envoi puis relâché, y compris en cas d'erreur. Un échec ne
/// concerne que cette interface : l'appelant peut continuer sa boucle sur les
/// interfaces restantes.
pub fn send_from_interface(
    data: &[u8],
    iface: &SsdpInterface,
    group: Ipv4Addr,
    port: u16,
) -> Result<(), SsdpError> {
    let socket =
        Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(SsdpError::SocketCreate)?;

    let bind_addr = SocketAddr::new(IpAddr::V4(iface.addr), 0);
    socket
        .bind(&bind_addr.into())
        .map_err(|e| SsdpError::Bind(iface.name.clone(), e))?;

    // Ne pas recevoir nos propres annonces
    socket
        .set_multicast_loop_v4(false)
        .map_err(|e| SsdpError::Send(iface.name.clone(), e))?;

    let dest = SocketAddr::new(IpAddr::V4(group), port);
    socket
        .send_to(data, &dest.into())
        .map_err(|e| SsdpError::Send(iface.name.clone(), e))?;

    debug!("📤 sent {} bytes from {} ({})", data.len(), iface.name, iface.addr);
    Ok(())
    // socket relâché ici, sur tous les chemins
}

/// Socket de réception SSDP longue durée
///
/// Propriété de la session ; relâché à sa destruction ou lors d'une
/// re-création explicite.
#[derive(Debug)]
pub struct SsdpReceiver {
    socket: UdpSocket,
}

impl SsdpReceiver {
    /// Ouvre le socket de réception : non bloquant, adresse réutilisable,
    /// lié au wildcard sur `port`, membre de `group` sur l'interface
    /// wildcard.
    ///
    /// Un échec d'adhésion au groupe multicast est signalé mais toléré : le
    /// socket reste utilisable pour les réponses unicast aux M-SEARCH.
    pub fn open(port: u16, group: Ipv4Addr) -> Result<Self, SsdpError> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(SsdpError::SocketCreate)?;
        socket2
            .set_reuse_address(true)
            .map_err(SsdpError::SocketCreate)?;
        socket2
            .set_nonblocking(true)
            .map_err(SsdpError::SocketCreate)?;

        let bind_addr: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
        socket2
            .bind(&bind_addr.into())
            .map_err(|e| SsdpError::Bind("0.0.0.0".to_string(), e))?;

        let socket: UdpSocket = socket2.into();

        match socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED) {
            Ok(()) => debug!("joined multicast group {}", group),
            Err(e) => warn!("❌ failed to join multicast group {}: {}", group, e),
        }

        Ok(Self { socket })
    }

    /// Lecture non bloquante d'un datagramme.
    ///
    /// # Returns
    ///
    /// `Ok(None)` quand aucun datagramme n'est disponible (issue normale d'un
    /// poll, pas une erreur), `Ok(Some((longueur, source)))` sinon.
    pub fn receive_one(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>, SsdpError> {
        match self.socket.recv_from(buf) {
            Ok((len, src)) => Ok(Some((len, src))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(SsdpError::Receive(e)),
        }
    }

    /// Envoi unicast depuis le socket de réception (réponses M-SEARCH).
    pub fn send_to(&self, data: &[u8], dest: SocketAddr) -> Result<(), SsdpError> {
        self.socket
            .send_to(data, dest)
            .map_err(|e| SsdpError::Send(dest.to_string(), e))?;
        Ok(())
    }

    /// Port local effectif (utile quand le socket est lié au port 0).
    pub fn local_port(&self) -> Result<u16, SsdpError> {
        Ok(self
            .socket
            .local_addr()
            .map_err(SsdpError::Receive)?
            .port())
    }
}

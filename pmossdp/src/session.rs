//! Session de découverte SSDP
//!
//! La session possède le socket de réception, la liste d'interfaces et le
//! template d'en-têtes du service local. Elle expose trois familles
//! d'opérations indépendantes : émettre un M-SEARCH, émettre un NOTIFY
//! (alive ou byebye), traiter un datagramme entrant. Aucune machine à états :
//! SSDP est sans état au niveau transport, et tout suivi des pairs découverts
//! relève de l'appelant.
//!
//! Modèle mono-thread, piloté par poll : l'appelant invoque [`SsdpSession::poll_once`]
//! depuis sa propre boucle d'événements et planifie lui-même les annonces
//! périodiques.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SsdpConfig;
use crate::error::SsdpError;
use crate::interface::SsdpInterface;
use crate::message::{self, SsdpMessage, SsdpMethod};
use crate::transport::{SsdpReceiver, send_from_interface};
use crate::SSDP_MULTICAST_ADDR;

// Taille du tampon de réception, alignée sur la taille maximale d'un message
const RECV_BUFFER_LEN: usize = 2048;

/// Composantes du champ LOCATION annoncé
///
/// Sans hôte explicite, LOCATION est construit avec l'adresse de l'interface
/// émettrice ; voir [`crate::message::encode_notify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsdpLocation {
    /// Hôte explicite ; `None` pour utiliser l'adresse de l'interface
    #[serde(default)]
    pub host: Option<String>,

    /// Port ajouté à LOCATION sous la forme `:port`
    #[serde(default)]
    pub port: Option<u16>,

    /// Suffixe ajouté à LOCATION sous la forme `/uri`
    #[serde(default)]
    pub uri: Option<String>,
}

/// Identité du service local, entrée de l'encodage NOTIFY/RESPONSE
///
/// Immuable pendant la vie de la session, sauf mise à jour explicite par
/// [`SsdpSession::set_header`]. Jamais émis tel quel sur le réseau.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SsdpHeader {
    /// Search Target annoncé et recherché (ex: "upnp:rootdevice")
    #[serde(default)]
    pub st: String,

    /// Unique Service Name (ex: "uuid:...")
    #[serde(default)]
    pub usn: String,

    #[serde(default)]
    pub location: SsdpLocation,

    /// Champ vendeur : identifiant court du service
    #[serde(default)]
    pub sm_id: String,

    /// Champ vendeur : type de device
    #[serde(default)]
    pub device_type: String,
}

impl SsdpHeader {
    /// Crée un template avec un USN généré (`uuid:<v4>`).
    pub fn new(st: String, device_type: String) -> Self {
        Self {
            st,
            usn: format!("uuid:{}", Uuid::new_v4()),
            location: SsdpLocation::default(),
            sm_id: String::new(),
            device_type,
        }
    }
}

/// Session de découverte SSDP
pub struct SsdpSession {
    header: SsdpHeader,
    interfaces: Vec<SsdpInterface>,
    receiver: SsdpReceiver,
    port: u16,
    respond_to_msearch: bool,
    handler: Option<Box<dyn FnMut(&SsdpMessage, SocketAddr)>>,
}

impl SsdpSession {
    /// Crée une session et ouvre son socket de réception.
    pub fn new(config: SsdpConfig) -> Result<Self, SsdpError> {
        let receiver = SsdpReceiver::open(config.port, SSDP_MULTICAST_ADDR)?;
        info!("✅ SSDP session ready on port {}", config.port);

        Ok(Self {
            header: config.header,
            interfaces: Vec::new(),
            receiver,
            port: config.port,
            respond_to_msearch: config.respond_to_msearch,
            handler: None,
        })
    }

    /// Enregistre le handler invoqué pour chaque message entrant décodé.
    pub fn set_handler<F>(&mut self, handler: F)
    where
        F: FnMut(&SsdpMessage, SocketAddr) + 'static,
    {
        self.handler = Some(Box::new(handler));
    }

    pub fn header(&self) -> &SsdpHeader {
        &self.header
    }

    /// Remplace le template d'en-têtes du service local.
    pub fn set_header(&mut self, header: SsdpHeader) {
        self.header = header;
    }

    /// Dernière liste d'interfaces énumérée.
    pub fn interfaces(&self) -> &[SsdpInterface] {
        &self.interfaces
    }

    /// Port local effectif du socket de réception.
    pub fn receiver_port(&self) -> Result<u16, SsdpError> {
        self.receiver.local_port()
    }

    /// Reconstruit entièrement la liste d'interfaces.
    ///
    /// Appelé avant chaque opération d'envoi : les interfaces ont pu changer
    /// depuis la dernière utilisation.
    pub fn refresh_interfaces(&mut self) -> Result<(), SsdpError> {
        self.interfaces = SsdpInterface::enumerate()?;
        Ok(())
    }

    /// Ferme puis recrée le socket de réception.
    pub fn reopen_receiver(&mut self) -> Result<(), SsdpError> {
        self.receiver = SsdpReceiver::open(self.port, SSDP_MULTICAST_ADDR)?;
        debug!("receive socket recreated on port {}", self.port);
        Ok(())
    }

    /// Émet un M-SEARCH sur chaque interface.
    ///
    /// Les échecs d'envoi sont isolés par interface : ils sont journalisés et
    /// n'interrompent pas la boucle. L'appel n'échoue que si l'encodage
    /// lui-même est impossible (champ du template invalide).
    pub fn send_msearch(&mut self) -> Result<(), SsdpError> {
        self.refresh_interfaces()?;

        let data = message::encode_msearch(SSDP_MULTICAST_ADDR, self.port, &self.header.st)?;

        for iface in &self.interfaces {
            if let Err(e) = send_from_interface(&data, iface, SSDP_MULTICAST_ADDR, self.port) {
                warn!("❌ M-SEARCH send failed on {}: {}", iface.name, e);
            }
        }
        info!("📤 M-SEARCH sent (ST={})", self.header.st);
        Ok(())
    }

    /// Émet un NOTIFY `ssdp:alive` sur chaque interface.
    ///
    /// LOCATION dépendant de l'adresse de l'interface émettrice, le message
    /// est ré-encodé pour chacune. Même isolation des échecs que
    /// [`SsdpSession::send_msearch`].
    pub fn send_notify(&mut self) -> Result<(), SsdpError> {
        self.refresh_interfaces()?;

        for iface in &self.interfaces {
            let data =
                message::encode_notify(&self.header, SSDP_MULTICAST_ADDR, self.port, iface.addr)?;
            if let Err(e) = send_from_interface(&data, iface, SSDP_MULTICAST_ADDR, self.port) {
                warn!("❌ NOTIFY send failed on {}: {}", iface.name, e);
            }
        }
        info!("📤 NOTIFY alive sent (USN={})", self.header.usn);
        Ok(())
    }

    /// Émet un NOTIFY `ssdp:byebye` sur chaque interface (retrait du service).
    pub fn send_byebye(&mut self) -> Result<(), SsdpError> {
        self.refresh_interfaces()?;

        let data = message::encode_byebye(&self.header, SSDP_MULTICAST_ADDR, self.port)?;

        for iface in &self.interfaces {
            if let Err(e) = send_from_interface(&data, iface, SSDP_MULTICAST_ADDR, self.port) {
                warn!("❌ NOTIFY byebye send failed on {}: {}", iface.name, e);
            }
        }
        info!("👋 NOTIFY byebye sent (USN={})", self.header.usn);
        Ok(())
    }

    /// Traite au plus un datagramme entrant.
    ///
    /// Sans donnée disponible, retourne `Ok(false)` immédiatement (issue
    /// normale d'un poll). Un datagramme indécodable est journalisé et
    /// abandonné sans atteindre le handler. Sur décodage réussi, répond
    /// éventuellement au M-SEARCH (voir [`SsdpConfig::respond_to_msearch`])
    /// puis invoque le handler enregistré.
    ///
    /// # Returns
    ///
    /// `Ok(true)` si un datagramme a été consommé, `Ok(false)` sinon.
    pub fn poll_once(&mut self) -> Result<bool, SsdpError> {
        let mut buf = [0u8; RECV_BUFFER_LEN];

        let (len, src) = match self.receiver.receive_one(&mut buf)? {
            Some(datagram) => datagram,
            None => return Ok(false),
        };

        let msg = match message::decode(&buf[..len]) {
            Ok(msg) => msg,
            Err(e) => {
                debug!("dropping datagram from {}: {}", src, e);
                return Ok(true);
            }
        };

        if self.respond_to_msearch && msg.method == SsdpMethod::MSearch {
            self.answer_msearch(&msg, src);
        }

        match self.handler.as_mut() {
            Some(handler) => handler(&msg, src),
            None => warn!("message handler has not been setup"),
        }
        Ok(true)
    }

    /// Répond en unicast à un M-SEARCH dont le ST correspond au service
    /// local (`ssdp:all` ou ST exact), depuis l'interface dont le sous-réseau
    /// contient l'émetteur.
    fn answer_msearch(&mut self, msg: &SsdpMessage, src: SocketAddr) {
        let st_matches = match msg.st() {
            Some(st) => st == "ssdp:all" || st == self.header.st,
            None => false,
        };
        if !st_matches {
            return;
        }

        if let Err(e) = self.refresh_interfaces() {
            warn!("❌ cannot answer M-SEARCH from {}: {}", src, e);
            return;
        }

        let src_ip = match src.ip() {
            IpAddr::V4(ip) => ip,
            IpAddr::V6(_) => return,
        };

        let iface = match self.interfaces.iter().find(|i| i.contains(src_ip)) {
            Some(iface) => iface,
            None => {
                debug!("no interface subnet contains M-SEARCH sender {}", src);
                return;
            }
        };

        match message::encode_response(&self.header, iface.addr) {
            Ok(data) => match self.receiver.send_to(&data, src) {
                Ok(()) => info!("📡 M-SEARCH response sent to {}", src),
                Err(e) => warn!("❌ failed to send M-SEARCH response to {}: {}", src, e),
            },
            Err(e) => warn!("❌ failed to encode M-SEARCH response: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SSDP_PORT;
    use std::cell::Cell;
    use std::net::UdpSocket;
    use std::rc::Rc;
    use std::time::Duration;

    fn test_session(respond_to_msearch: bool) -> SsdpSession {
        let config = SsdpConfig {
            // Port 0 : éphémère, pour ne pas dépendre du port 1900
            port: 0,
            respond_to_msearch,
            header: SsdpHeader {
                st: "urn:pmo-test:device:Player:1".to_string(),
                usn: "uuid:00000000-0000-0000-0000-000000000001".to_string(),
                location: SsdpLocation {
                    host: None,
                    port: Some(8080),
                    uri: Some("desc.xml".to_string()),
                },
                sm_id: "pmo".to_string(),
                device_type: "Player".to_string(),
            },
        };
        SsdpSession::new(config).unwrap()
    }

    /// Envoie `data` vers le port de la session et attend sa consommation.
    fn deliver(session: &mut SsdpSession, data: &[u8]) -> UdpSocket {
        let port = session.receiver_port().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender.send_to(data, ("127.0.0.1", port)).unwrap();

        for _ in 0..50 {
            if session.poll_once().unwrap() {
                return sender;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("datagram was never consumed");
    }

    #[test]
    fn test_poll_once_empty_queue_is_noop() {
        let invoked = Rc::new(Cell::new(0));
        let counter = Rc::clone(&invoked);

        let mut session = test_session(false);
        session.set_handler(move |_, _| counter.set(counter.get() + 1));

        assert_eq!(session.poll_once().unwrap(), false, "no data must be a no-op");
        assert_eq!(invoked.get(), 0, "handler must not run without a datagram");
    }

    #[test]
    fn test_poll_once_invokes_handler_on_decoded_message() {
        let seen_st = Rc::new(Cell::new(false));
        let flag = Rc::clone(&seen_st);

        let mut session = test_session(false);
        session.set_handler(move |msg, _| {
            if msg.method == SsdpMethod::Notify && msg.st() == Some("upnp:rootdevice") {
                flag.set(true);
            }
        });

        let header = SsdpHeader {
            st: "upnp:rootdevice".to_string(),
            usn: "uuid:abcd".to_string(),
            ..SsdpHeader::default()
        };
        let data =
            crate::message::encode_notify(&header, SSDP_MULTICAST_ADDR, SSDP_PORT, [10, 0, 0, 1].into())
                .unwrap();

        deliver(&mut session, &data);
        assert!(seen_st.get(), "handler should see the decoded NOTIFY");
    }

    #[test]
    fn test_poll_once_drops_unrecognized_method() {
        let invoked = Rc::new(Cell::new(0));
        let counter = Rc::clone(&invoked);

        let mut session = test_session(false);
        session.set_handler(move |_, _| counter.set(counter.get() + 1));

        deliver(&mut session, b"GET / HTTP/1.1\r\nHOST:nope\r\n\r\n");
        assert_eq!(invoked.get(), 0, "undecodable datagrams must never reach the handler");
    }

    #[test]
    fn test_msearch_gets_a_unicast_response() {
        let mut session = test_session(true);
        session.set_handler(|_, _| {});

        // Le routage de la réponse exige une interface dont le sous-réseau
        // contient 127.0.0.1 (l'interface loopback)
        let interfaces = SsdpInterface::enumerate().unwrap_or_default();
        if !interfaces.iter().any(|i| i.contains([127, 0, 0, 1].into())) {
            eprintln!("no loopback interface enumerated, skipping");
            return;
        }

        let data = crate::message::encode_msearch(
            SSDP_MULTICAST_ADDR,
            SSDP_PORT,
            "urn:pmo-test:device:Player:1",
        )
        .unwrap();

        let sender = deliver(&mut session, &data);
        sender
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();

        let mut buf = [0u8; 2048];
        let (len, _) = sender.recv_from(&mut buf).expect("a response should arrive");
        let response = crate::message::decode(&buf[..len]).unwrap();

        assert_eq!(response.method, SsdpMethod::Response);
        assert_eq!(response.st(), Some("urn:pmo-test:device:Player:1"));
        assert_eq!(
            response.location(),
            Some("127.0.0.1:8080/desc.xml"),
            "LOCATION must use the answering interface address"
        );
    }

    #[test]
    fn test_reopen_receiver_keeps_session_usable() {
        let mut session = test_session(false);
        session.reopen_receiver().unwrap();

        assert_eq!(session.poll_once().unwrap(), false);
    }
}

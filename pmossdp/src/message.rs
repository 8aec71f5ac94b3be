//! Encodage et décodage des messages SSDP
//!
//! Le format filaire est du texte ASCII de type HTTP : une ligne de statut,
//! des lignes `CHAMP:valeur` séparées par CRLF, puis une ligne vide. Trois
//! variantes existent :
//!
//! - `M-SEARCH * HTTP/1.1` : recherche active d'un service
//! - `NOTIFY * HTTP/1.1` : annonce spontanée (`ssdp:alive` / `ssdp:byebye`)
//! - `HTTP/1.1 200 OK` : réponse unicast à un M-SEARCH
//!
//! Le décodeur est tolérant ligne à ligne : une ligne malformée est ignorée
//! sans invalider le reste du message. Seule une ligne de statut inconnue est
//! une erreur dure.

use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::CACHE_MAX_AGE;
use crate::error::SsdpError;
use crate::session::SsdpHeader;

/// Longueur maximale d'une valeur de champ décodée (troncature au-delà)
pub const MAX_FIELD_LEN: usize = 256;

const MSEARCH_LINE: &str = "M-SEARCH * HTTP/1.1\r\n";
const NOTIFY_LINE: &str = "NOTIFY * HTTP/1.1\r\n";
const RESPONSE_LINE: &str = "HTTP/1.1 200 OK\r\n";

// Champs UDA v1.1 ajoutés aux annonces NOTIFY
const UDA_V1_1: &str = "OPT:\"http://schemas.upnp.org/upnp/1/0/\"; ns=01\r\n\
                        01-NLS:1\r\n\
                        BOOTID.UPNP.ORG:1\r\n\
                        CONFIGID.UPNP.ORG:1337\r\n";

/// Méthode d'un message SSDP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdpMethod {
    MSearch,
    Notify,
    Response,
}

impl SsdpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SsdpMethod::MSearch => "M-SEARCH",
            SsdpMethod::Notify => "NOTIFY",
            SsdpMethod::Response => "RESPONSE",
        }
    }
}

impl fmt::Display for SsdpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message SSDP décodé : une méthode et des champs ordonnés
///
/// Les noms de champs sont normalisés en majuscules et interrogés sans
/// sensibilité à la casse. Les champs inconnus sont conservés tels quels,
/// dans leur ordre d'arrivée.
#[derive(Debug, Clone)]
pub struct SsdpMessage {
    pub method: SsdpMethod,
    fields: Vec<(String, String)>,
}

impl SsdpMessage {
    /// Valeur d'un champ, recherche insensible à la casse.
    pub fn field(&self, name: &str) -> Option<&str> {
        let upper = name.to_ascii_uppercase();
        self.fields
            .iter()
            .find(|(n, _)| *n == upper)
            .map(|(_, v)| v.as_str())
    }

    /// Itère sur les paires (nom, valeur) dans l'ordre du message.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn st(&self) -> Option<&str> {
        self.field("ST")
    }

    pub fn usn(&self) -> Option<&str> {
        self.field("USN")
    }

    pub fn location(&self) -> Option<&str> {
        self.field("LOCATION")
    }

    pub fn nts(&self) -> Option<&str> {
        self.field("NTS")
    }

    pub fn sm_id(&self) -> Option<&str> {
        self.field("SM_ID")
    }

    pub fn device_type(&self) -> Option<&str> {
        self.field("DEV_TYPE")
    }
}

/// Raison d'abandon d'une ligne de champ (jamais fatal pour le message)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldLineError {
    EmptyFieldName,
    MissingColon,
    EmptyValue,
}

impl fmt::Display for FieldLineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            FieldLineError::EmptyFieldName => "empty field name",
            FieldLineError::MissingColon => "no colon in line",
            FieldLineError::EmptyValue => "empty field value",
        };
        f.write_str(reason)
    }
}

/// Décode un datagramme SSDP brut.
///
/// La méthode est identifiée par comparaison exacte du préfixe avec les trois
/// lignes de statut connues, dans l'ordre M-SEARCH, NOTIFY, RESPONSE. Le
/// reste est découpé strictement sur CRLF ; une fin de tampon sans CRLF clôt
/// l'analyse sur ce qui a déjà été extrait. Chaque ligne malformée est
/// ignorée individuellement.
///
/// # Returns
///
/// Le message décodé, ou [`SsdpError::UnrecognizedMethod`] si la première
/// ligne ne correspond à aucune des trois méthodes.
pub fn decode(data: &[u8]) -> Result<SsdpMessage, SsdpError> {
    let (method, status_len) = if data.starts_with(MSEARCH_LINE.as_bytes()) {
        (SsdpMethod::MSearch, MSEARCH_LINE.len())
    } else if data.starts_with(NOTIFY_LINE.as_bytes()) {
        (SsdpMethod::Notify, NOTIFY_LINE.len())
    } else if data.starts_with(RESPONSE_LINE.as_bytes()) {
        (SsdpMethod::Response, RESPONSE_LINE.len())
    } else {
        let first = first_line_lossy(data);
        debug!("received unknown SSDP packet: {:?}", first);
        return Err(SsdpError::UnrecognizedMethod(first));
    };

    let body = String::from_utf8_lossy(&data[status_len..]);
    let mut fields = Vec::new();

    let mut rest: &str = &body;
    while let Some(pos) = rest.find("\r\n") {
        let line = &rest[..pos];
        rest = &rest[pos + 2..];

        // Ligne vide : fin des en-têtes
        if line.is_empty() {
            break;
        }

        match parse_field_line(line) {
            Ok((name, value)) => fields.push((name, value)),
            Err(reason) => trace!("skipping malformed line {:?}: {}", line, reason),
        }
    }
    // Un fragment final sans CRLF est abandonné, le reste du message est rendu

    Ok(SsdpMessage { method, fields })
}

/// Découpe une ligne `CHAMP:valeur` sur son premier deux-points.
fn parse_field_line(line: &str) -> Result<(String, String), FieldLineError> {
    if line.starts_with(':') {
        return Err(FieldLineError::EmptyFieldName);
    }

    let colon = line.find(':').ok_or(FieldLineError::MissingColon)?;

    let name = line[..colon].trim();
    if name.is_empty() {
        return Err(FieldLineError::EmptyFieldName);
    }

    let value = line[colon + 1..].trim();
    if value.is_empty() {
        return Err(FieldLineError::EmptyValue);
    }

    Ok((name.to_ascii_uppercase(), truncate_value(value).to_string()))
}

/// Tronque une valeur à [`MAX_FIELD_LEN`] octets, sur une frontière UTF-8.
fn truncate_value(value: &str) -> &str {
    if value.len() <= MAX_FIELD_LEN {
        return value;
    }
    let mut end = MAX_FIELD_LEN;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn first_line_lossy(data: &[u8]) -> String {
    let end = data
        .iter()
        .position(|&b| b == b'\r' || b == b'\n')
        .unwrap_or(data.len())
        .min(80);
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Refuse les valeurs qui casseraient le framing CRLF.
fn check_field(name: &str, value: &str) -> Result<(), SsdpError> {
    if value.contains(['\r', '\n']) {
        return Err(SsdpError::invalid_field(name));
    }
    Ok(())
}

fn check_header(header: &SsdpHeader) -> Result<(), SsdpError> {
    check_field("ST", &header.st)?;
    check_field("USN", &header.usn)?;
    check_field("SM_ID", &header.sm_id)?;
    check_field("DEV_TYPE", &header.device_type)?;
    if let Some(host) = &header.location.host {
        check_field("LOCATION", host)?;
    }
    if let Some(uri) = &header.location.uri {
        check_field("LOCATION", uri)?;
    }
    Ok(())
}

/// Calcule le champ LOCATION : hôte explicite du template, sinon l'adresse
/// de l'interface émettrice, suivie du port et de l'URI optionnels.
fn build_location(header: &SsdpHeader, iface_addr: Ipv4Addr) -> String {
    let mut location = match &header.location.host {
        Some(host) if !host.is_empty() => host.clone(),
        _ => iface_addr.to_string(),
    };
    if let Some(port) = header.location.port {
        location.push_str(&format!(":{}", port));
    }
    if let Some(uri) = &header.location.uri {
        if !uri.is_empty() {
            location.push('/');
            location.push_str(uri);
        }
    }
    location
}

/// Encode une requête M-SEARCH.
pub fn encode_msearch(group: Ipv4Addr, port: u16, st: &str) -> Result<Vec<u8>, SsdpError> {
    check_field("ST", st)?;

    let msg = format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST:{}:{}\r\n\
         MAN:\"ssdp:discover\"\r\n\
         ST:{}\r\n\
         MX:1\r\n\
         \r\n",
        group, port, st
    );
    Ok(msg.into_bytes())
}

/// Encode une annonce NOTIFY `ssdp:alive` pour une interface donnée.
///
/// LOCATION dépendant de l'interface émettrice, l'annonce doit être encodée
/// une fois par interface, pas une fois globalement.
pub fn encode_notify(
    header: &SsdpHeader,
    group: Ipv4Addr,
    port: u16,
    iface_addr: Ipv4Addr,
) -> Result<Vec<u8>, SsdpError> {
    check_header(header)?;

    let msg = format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST:{}:{}\r\n\
         CACHE-CONTROL:max-age={}\r\n\
         ST:{}\r\n\
         USN:{}\r\n\
         LOCATION:{}\r\n\
         SM_ID:{}\r\n\
         DEV_TYPE:{}\r\n\
         {}\
         NTS:ssdp:alive\r\n\
         \r\n",
        group,
        port,
        CACHE_MAX_AGE,
        header.st,
        header.usn,
        build_location(header, iface_addr),
        header.sm_id,
        header.device_type,
        UDA_V1_1
    );
    Ok(msg.into_bytes())
}

/// Encode une annonce NOTIFY `ssdp:byebye` (retrait du service).
pub fn encode_byebye(header: &SsdpHeader, group: Ipv4Addr, port: u16) -> Result<Vec<u8>, SsdpError> {
    check_header(header)?;

    let msg = format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST:{}:{}\r\n\
         ST:{}\r\n\
         USN:{}\r\n\
         NTS:ssdp:byebye\r\n\
         \r\n",
        group, port, header.st, header.usn
    );
    Ok(msg.into_bytes())
}

/// Encode une réponse unicast à un M-SEARCH.
pub fn encode_response(header: &SsdpHeader, iface_addr: Ipv4Addr) -> Result<Vec<u8>, SsdpError> {
    check_header(header)?;

    let msg = format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL:max-age={}\r\n\
         EXT:\r\n\
         ST:{}\r\n\
         USN:{}\r\n\
         LOCATION:{}\r\n\
         SM_ID:{}\r\n\
         DEV_TYPE:{}\r\n\
         \r\n",
        CACHE_MAX_AGE,
        header.st,
        header.usn,
        build_location(header, iface_addr),
        header.sm_id,
        header.device_type
    );
    Ok(msg.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_field_line_splits_on_first_colon() {
        let (name, value) = parse_field_line("LOCATION:http://192.168.1.5:8080/desc.xml").unwrap();

        assert_eq!(name, "LOCATION");
        assert_eq!(value, "http://192.168.1.5:8080/desc.xml", "value may contain ':'");
    }

    #[test]
    fn test_parse_field_line_rejects_leading_colon() {
        assert_eq!(
            parse_field_line(":value"),
            Err(FieldLineError::EmptyFieldName)
        );
    }

    #[test]
    fn test_parse_field_line_rejects_missing_colon() {
        assert_eq!(
            parse_field_line("NO COLON HERE"),
            Err(FieldLineError::MissingColon)
        );
    }

    #[test]
    fn test_parse_field_line_rejects_empty_value() {
        assert_eq!(parse_field_line("EXT:"), Err(FieldLineError::EmptyValue));
        assert_eq!(parse_field_line("EXT:   "), Err(FieldLineError::EmptyValue));
    }

    #[test]
    fn test_parse_field_line_is_case_insensitive() {
        let (name, _) = parse_field_line("st:upnp:rootdevice").unwrap();
        assert_eq!(name, "ST");
    }

    #[test]
    fn test_truncate_value_respects_char_boundaries() {
        // 300 octets de '€' (3 octets chacun) : la coupe à 256 tombe au
        // milieu d'un caractère et doit reculer jusqu'à la frontière
        let long: String = "€".repeat(100);
        let truncated = truncate_value(&long);

        assert!(truncated.len() <= MAX_FIELD_LEN);
        assert_eq!(truncated.len() % 3, 0, "truncation must not split a 3-byte char");
        assert_eq!(truncated.len(), 255);
    }

    #[test]
    fn test_truncate_value_keeps_short_values() {
        assert_eq!(truncate_value("ssdp:alive"), "ssdp:alive");
    }

    #[test]
    fn test_decode_rejects_unknown_status_line() {
        let err = decode(b"GET / HTTP/1.1\r\nHOST:example\r\n\r\n").unwrap_err();
        assert!(matches!(err, SsdpError::UnrecognizedMethod(_)));
    }

    #[test]
    fn test_decode_stops_at_unterminated_line() {
        // La seconde ligne n'a pas de CRLF : elle est abandonnée, la première
        // a déjà été extraite
        let msg = decode(b"NOTIFY * HTTP/1.1\r\nST:upnp:rootdevice\r\nUSN:uuid:1234").unwrap();

        assert_eq!(msg.st(), Some("upnp:rootdevice"));
        assert_eq!(msg.usn(), None);
    }

    #[test]
    fn test_decode_overlong_value_does_not_corrupt_next_field() {
        let long = "x".repeat(MAX_FIELD_LEN * 2);
        let raw = format!(
            "NOTIFY * HTTP/1.1\r\nLOCATION:{}\r\nUSN:uuid:1234\r\n\r\n",
            long
        );
        let msg = decode(raw.as_bytes()).unwrap();

        assert_eq!(msg.location().map(|v| v.len()), Some(MAX_FIELD_LEN));
        assert_eq!(msg.usn(), Some("uuid:1234"), "field after the overflow must stay intact");
    }

    #[test]
    fn test_encode_msearch_rejects_crlf_in_st() {
        let err = encode_msearch(crate::SSDP_MULTICAST_ADDR, 1900, "evil\r\nUSN:forged");
        assert!(matches!(err, Err(SsdpError::InvalidField(_))));
    }
}

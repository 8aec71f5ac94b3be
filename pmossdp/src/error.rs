use thiserror::Error;

#[derive(Error, Debug)]
pub enum SsdpError {
    // Énumération des interfaces réseau (fatal pour l'appel en cours)
    #[error("network interface enumeration failed: {0}")]
    Enumeration(#[source] std::io::Error),

    #[error("failed to create UDP socket: {0}")]
    SocketCreate(#[source] std::io::Error),

    #[error("failed to bind socket on interface {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("failed to send on interface {0}: {1}")]
    Send(String, #[source] std::io::Error),

    #[error("failed to receive datagram: {0}")]
    Receive(#[source] std::io::Error),

    // Un champ sortant contenant CR ou LF casserait le framing CRLF
    #[error("header field {0} contains a CR or LF character")]
    InvalidField(String),

    #[error("unrecognized SSDP status line: {0:?}")]
    UnrecognizedMethod(String),

    #[error("cannot read configuration file {0}: {1}")]
    ConfigRead(String, #[source] std::io::Error),

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),
}

impl SsdpError {
    pub fn invalid_field(name: &str) -> Self {
        SsdpError::InvalidField(name.to_string())
    }
}

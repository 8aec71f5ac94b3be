use std::thread;
use std::time::{Duration, Instant};

use pmossdp::{SsdpConfig, SsdpHeader, SsdpLocation, SsdpSession};

fn main() -> Result<(), pmossdp::SsdpError> {
    tracing_subscriber::fmt::init();

    let mut header = SsdpHeader::new(
        "urn:pmo:device:Demo:1".to_string(),
        "Demo".to_string(),
    );
    header.location = SsdpLocation {
        host: None, // LOCATION prendra l'adresse de chaque interface
        port: Some(8080),
        uri: Some("description.xml".to_string()),
    };
    header.sm_id = "pmossdp-demo".to_string();

    let config = SsdpConfig {
        respond_to_msearch: true,
        header,
        ..SsdpConfig::default()
    };

    let mut session = SsdpSession::new(config)?;
    session.set_handler(|msg, from| {
        tracing::debug!("incoming {} from {}", msg.method, from);
    });

    println!("Announcing for 60 seconds, then sending byebye.");

    let deadline = Instant::now() + Duration::from_secs(60);
    let mut next_notify = Instant::now();
    while Instant::now() < deadline {
        if Instant::now() >= next_notify {
            session.send_notify()?;
            next_notify = Instant::now() + Duration::from_secs(10);
        }
        if !session.poll_once()? {
            thread::sleep(Duration::from_millis(100));
        }
    }

    session.send_byebye()?;
    Ok(())
}

use std::thread;
use std::time::{Duration, Instant};

use pmossdp::{SsdpConfig, SsdpHeader, SsdpMethod, SsdpSession};

fn main() -> Result<(), pmossdp::SsdpError> {
    tracing_subscriber::fmt::init();
    tracing::info!("Starting SSDP discovery dump...");

    let config = SsdpConfig {
        header: SsdpHeader {
            st: "ssdp:all".to_string(),
            ..SsdpHeader::default()
        },
        ..SsdpConfig::default()
    };

    let mut session = SsdpSession::new(config)?;
    session.set_handler(|msg, from| match msg.method {
        SsdpMethod::Notify => {
            println!(
                "[NOTIFY] from={} nts={} st={} usn={} location={}",
                from,
                msg.nts().unwrap_or("-"),
                msg.st().unwrap_or("-"),
                msg.usn().unwrap_or("-"),
                msg.location().unwrap_or("-"),
            );
        }
        SsdpMethod::Response => {
            println!(
                "[RESPONSE] from={} st={} usn={} location={}",
                from,
                msg.st().unwrap_or("-"),
                msg.usn().unwrap_or("-"),
                msg.location().unwrap_or("-"),
            );
        }
        SsdpMethod::MSearch => {
            println!("[M-SEARCH] from={} st={}", from, msg.st().unwrap_or("-"));
        }
    });

    session.send_msearch()?;

    println!("Listening for SSDP messages for 30 seconds. Ctrl+C to stop earlier.");

    let deadline = Instant::now() + Duration::from_secs(30);
    while Instant::now() < deadline {
        // Socket non bloquant : dormir un peu quand rien n'est disponible
        if !session.poll_once()? {
            thread::sleep(Duration::from_millis(100));
        }
    }
    Ok(())
}

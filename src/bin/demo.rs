//! FPM Gateway Demo
//!
//! Runs the gateway tick loop against a simulated meter and one simulated
//! browser client:
//! - Login and key issue
//! - Session handshake and startup
//! - Info sweep followed by electrical sweeps
//! - A raw Modbus write from the client
//!
//! Usage: cargo run --bin demo [seconds]
//! Example: RUST_LOG=fpm_gateway=debug cargo run --bin demo 5

use std::time::Duration;

use fpm_gateway::crc::Crc16;
use fpm_gateway::constants::FC_READ_HOLDING_REGISTERS;
use fpm_gateway::serial::ScriptedLink;
use fpm_gateway::server::RecordingServer;
use fpm_gateway::settings::MemoryStore;
use fpm_gateway::{Catalogue, Gateway, GatewayConfig, SystemClock};
use tracing_subscriber::EnvFilter;

const CLIENT_FD: i32 = 10;

/// Meter that answers reads with 230.5 in every float-sized value and echoes writes
fn simulated_meter() -> ScriptedLink {
    ScriptedLink::with_responder(|frame| {
        if frame.len() < 8 {
            return None;
        }
        let mut reply = if frame[1] == FC_READ_HOLDING_REGISTERS {
            let quantity = u16::from_be_bytes([frame[4], frame[5]]) as usize;
            let mut reply = vec![frame[0], frame[1], (quantity * 2) as u8];
            if quantity == 2 {
                reply.extend_from_slice(&230.5f32.to_be_bytes());
            } else {
                for _ in 0..quantity {
                    reply.extend_from_slice(&[0x00, frame[3]]);
                }
            }
            reply
        } else {
            frame[..frame.len() - 2].to_vec()
        };
        let crc = Crc16::checksum(&reply);
        reply.extend_from_slice(&crc);
        Some(reply)
    })
}

/// Acknowledgement a browser sends for a received console frame
fn client_ack(frame: &str) -> &'static str {
    const ACKS: [(&str, &str); 4] = [
        ("&console#rdmeter=", "#rdmeterz"),
        ("&console#inform=", "#informz"),
        ("&console#infor=", "#inforz"),
        ("&console#validate=1", "#validate=1z"),
    ];
    ACKS.iter()
        .find(|(prefix, _)| frame.starts_with(prefix))
        .map(|(_, ack)| *ack)
        .unwrap_or("#persistent")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fpm_gateway=info")),
        )
        .init();

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(4);

    println!("⚡ {}", fpm_gateway::info());
    println!("=============================");

    let mut gateway = Gateway::new(
        GatewayConfig::default(),
        Catalogue::wago_879_3040(),
        simulated_meter(),
        RecordingServer::new(),
        MemoryStore::new(),
        SystemClock::new(),
    )?;

    // =========================================================================
    // Part 1: Login
    // =========================================================================
    println!("\n🔑 Part 1: Login");
    println!("----------------");

    let reply = gateway.login(r#"{"username":"admin","password":"admin"}"#)?;
    println!("  Reply: {}", reply.to_json()?);
    let key: u32 = reply.key.parse()?;
    println!("  Endpoints: {:?}", gateway.server().endpoints());

    // =========================================================================
    // Part 2: Session
    // =========================================================================
    println!("\n🔌 Part 2: Session on socket {}", CLIENT_FD);
    println!("------------------------------");

    gateway.on_handshake(CLIENT_FD, &[]);
    let mut client_counter = 0u32;
    gateway.on_text(CLIENT_FD, &format!("&console#new_ws=*{key}*{client_counter}"))?;
    client_counter += 1;

    // =========================================================================
    // Part 3: Tick loop
    // =========================================================================
    println!("\n⏱️  Part 3: Running for {}s", seconds);
    println!("---------------------------");

    let mut interval = tokio::time::interval(Duration::from_millis(25));
    let ticks = seconds * 1000 / 25;
    let mut write_sent = false;
    let mut frames = 0usize;

    for _ in 0..ticks {
        interval.tick().await;
        if let Some(reason) = gateway.tick() {
            println!("  Restart requested: {:?}", reason);
            break;
        }

        for (fd, frame) in gateway.server_mut().take_sent() {
            frames += 1;
            let preview: String = frame.chars().take(60).collect();
            println!("  -> {} {}", fd, preview.replace('\n', " "));

            if frame.starts_with("&console#close") {
                continue;
            }
            let ack = client_ack(&frame);
            if let Err(e) = gateway.on_text(fd, &format!("&console{ack}*{key}*{client_counter}")) {
                println!("  ⚠️  Ack dropped: {}", e);
            }
            client_counter += 1;
        }

        if !write_sent && !gateway.electrical_snapshot().is_empty() {
            println!("  ✏️  Writing 0x0002 to register 0x4003");
            gateway.on_text(
                CLIENT_FD,
                &format!("&console#modbuswr?01 06 40 03 00 02*{key}*{client_counter}"),
            )?;
            client_counter += 1;
            write_sent = true;
        }
    }

    // =========================================================================
    // Part 4: Summary
    // =========================================================================
    println!("\n📊 Part 4: Summary");
    println!("------------------");

    println!("  Frames sent to clients: {}", frames);
    println!("  Serial frames transmitted: {}", gateway.master().link().sent().len());
    println!("  Info report: {} bytes", gateway.info_snapshot().len());
    println!("  Electrical report: {} bytes", gateway.electrical_snapshot().len());
    if let Some(session) = gateway.sessions().get(CLIENT_FD) {
        println!(
            "  Session {}: startup_done={}, in={}, out={}",
            session.fd, session.startup_done, session.in_count, session.out_count
        );
    }

    println!("\n🎉 Demo completed!");
    Ok(())
}

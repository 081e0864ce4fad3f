//! Play a contact sweep into a running bridge, posing as VRChat
//!
//! ```text
//! cargo run --example send_osc -- headTop
//! cargo run --example send_osc -- headTop --target 127.0.0.1:9001 --cycles 3
//! ```
//!
//! Proximity ramps 0 -> 1 -> 0 on `<prefix><name>`, then stops so the
//! bridge's inactivity timeout can be observed.

use clap::Parser;
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::UdpSocket;
use std::thread;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Send an OSC proximity sweep")]
struct Args {
    /// Actuator name
    name: String,

    /// Bridge receiving address
    #[arg(long, default_value = "127.0.0.1:9001")]
    target: String,

    /// Parameter path prefix
    #[arg(long, default_value = "/avatar/parameters/haptX-")]
    prefix: String,

    /// Number of ramps up and down
    #[arg(long, default_value_t = 1)]
    cycles: u32,

    /// Steps per ramp
    #[arg(long, default_value_t = 25)]
    steps: u32,

    /// Delay between messages in milliseconds
    #[arg(long, default_value_t = 20)]
    interval_ms: u64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    let path = format!("{}{}", args.prefix, args.name);
    let interval = Duration::from_millis(args.interval_ms);
    let steps = args.steps.max(1);

    log::info!("Sweeping {} on {}", path, args.target);
    for _ in 0..args.cycles {
        let up = (0..=steps).map(|i| i as f32 / steps as f32);
        let down = (0..steps).rev().map(|i| i as f32 / steps as f32);
        for proximity in up.chain(down) {
            let packet = OscPacket::Message(OscMessage {
                addr: path.clone(),
                args: vec![OscType::Float(proximity)],
            });
            let bytes = encoder::encode(&packet).map_err(|e| format!("{:?}", e))?;
            socket.send_to(&bytes, &args.target)?;
            log::debug!("{} = {:.2}", path, proximity);
            thread::sleep(interval);
        }
    }
    log::info!("Done");
    Ok(())
}

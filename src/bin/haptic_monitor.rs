//! Haptic Monitor - stand-in UDP device that prints every actuation
//!
//! Point a controller's UDP connection at this program to watch what the
//! bridge would drive, without hardware:
//!
//! ```text
//! actuate # 2: 128 |*************************             >            |
//!                   \_ current level _/                  \_ peak
//! ```
//!
//! Usage:
//!   haptic-monitor [--bind 127.0.0.1:1337] [--battery 4095]
//!
//! With `--battery`, battery queries are answered like a real device would.

use clap::Parser;
use haptic_bridge::protocol::daky::{TAG_ACTUATION, TAG_BATTERY};
use std::collections::HashMap;
use std::net::UdpSocket;

/// Characters in the level bar; one per 5 units of the 0-255 scale
const BAR_WIDTH: usize = 52;

#[derive(Parser, Debug)]
#[command(name = "haptic-monitor", version, about = "Print actuations received over UDP")]
struct Args {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:1337")]
    bind: String,

    /// Reply to battery queries with this level
    #[arg(long)]
    battery: Option<u16>,
}

fn bar(level: u8, peak: u8) -> String {
    let scale = |v: u8| (v as usize + 2) / 5;
    let mut bar: Vec<char> = (0..BAR_WIDTH)
        .map(|i| if i < scale(level) { '*' } else { ' ' })
        .collect();
    if let Some(slot) = bar.get_mut(scale(peak)) {
        *slot = '>';
    }
    bar.into_iter().collect()
}

fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let socket = UdpSocket::bind(&args.bind)?;
    log::info!("Listening on {}", socket.local_addr()?);

    let mut peaks: HashMap<u8, u8> = HashMap::new();
    let mut buf = [0u8; 4096];
    loop {
        let (n, from) = socket.recv_from(&mut buf)?;
        let data = &buf[..n];

        match data {
            [TAG_ACTUATION, address, level] => {
                let peak = peaks.entry(*address).or_insert(0);
                *peak = (*peak).max(*level);
                println!("actuate #{:2}: {:3} |{}|", address, level, bar(*level, *peak));
            }
            [TAG_BATTERY] => match args.battery {
                Some(level) => {
                    let [lo, hi] = level.to_le_bytes();
                    socket.send_to(&[TAG_BATTERY, lo, hi], from)?;
                    log::info!("Battery query from {}, replied {}", from, level);
                }
                None => log::info!("Battery query from {}", from),
            },
            _ => log::warn!("Unrecognized {} byte(s) from {}: {:02X?}", n, from, data),
        }
    }
}

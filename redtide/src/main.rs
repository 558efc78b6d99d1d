use std::{env, process::exit};

use anyhow::{anyhow, bail, Context, Result};
use redtide_lib::ipc::{Client, DEFAULT_ENDPOINT};
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn usage() -> ! {
    eprintln!(
        "usage: {0} read <pid> <address> <length>\n       {0} write <pid> <address> <hex-bytes>\n       {0} version",
        env!("CARGO_PKG_NAME")
    );
    exit(2);
}

fn parse_address(text: &str) -> Result<u64> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.with_context(|| format!("invalid address: {}", text))
}

fn parse_hex_bytes(text: &str) -> Result<Vec<u8>> {
    let digits: Vec<u8> = text
        .bytes()
        .filter(|b| !b.is_ascii_whitespace() && *b != b':')
        .collect();
    if digits.len() % 2 != 0 {
        bail!("odd number of hex digits");
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| anyhow!("invalid hex byte: {}", String::from_utf8_lossy(pair)))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let endpoint = env::var("REDTIDE_SOCKET").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_owned());
    let mut args = env::args().skip(1);
    let Some(command) = args.next() else { usage() };
    let rest: Vec<String> = args.collect();

    debug!("connecting to {}", endpoint);
    let mut client = Client::connect(&endpoint)
        .await
        .with_context(|| format!("failed to connect to {}", endpoint))?;

    match (command.as_str(), rest.as_slice()) {
        ("read", [pid, address, length]) => {
            let pid = pid.parse().context("invalid pid")?;
            let address = parse_address(address)?;
            let length = length.parse().context("invalid length")?;
            let data = client.read(pid, address, length).await?;
            println!("{}", to_hex(&data));
        }
        ("write", [pid, address, bytes]) => {
            let pid = pid.parse().context("invalid pid")?;
            let address = parse_address(address)?;
            let data = parse_hex_bytes(bytes)?;
            let written = client.write(pid, address, &data).await?;
            println!("{}", written);
        }
        ("version", []) => println!("{}", client.version().await?),
        _ => usage(),
    }
    Ok(())
}

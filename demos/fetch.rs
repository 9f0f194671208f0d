//! Minimal client: fetch one uri from a host:port on the command line.
use std::io::Write;
use std::net::TcpStream;

use h1kit::{Connection, Headers};

fn main() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let address = args.next().unwrap_or_else(|| "127.0.0.1:8080".to_owned());
    let uri = args.next().unwrap_or_else(|| "/".to_owned());

    let stream = TcpStream::connect(&address)?;

    let mut base = Headers::new();
    base.insert("host", address.as_str());

    let mut conn = Connection::new(stream, base);
    let mut response = conn.get(&uri, Headers::new())?;

    eprintln!("{} {}", response.status, response.reason);
    for (name, value) in response.headers.iter() {
        eprintln!("{name}: {value}");
    }

    if let Some(body) = response.body.as_mut() {
        let data = body.read_all()?;
        std::io::stdout().write_all(&data)?;
    }

    Ok(())
}

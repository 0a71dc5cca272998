//! Tunnel relay example: a front-end relays one TCP client to a backend over
//! a framed link.
//!
//! Run with:
//!   cargo run --example tunnel-relay

use std::io::{self, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream};
use std::thread;

use proxypack::frame::{Descriptor, FrameReader, FrameWriter, Handlers, Message};
use proxypack::transport::socket_to_addr;
use tracing::info;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    let backend = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let backend_addr = backend.local_addr()?;
    let public = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    let public_addr = public.local_addr()?;

    let backend_thread = thread::spawn(
        move || -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            let (link, _) = backend.accept()?;
            let handlers = Handlers::new(|m: Message| {
                info!(
                    id = %m.id(),
                    service = %m.service,
                    "[backend] data: {}",
                    String::from_utf8_lossy(&m.body)
                );
            })
            .on_connection(|m: Message| {
                info!(id = %m.id(), service = %m.service, "[backend] client connected");
            })
            .on_end(|m: Message| info!(id = %m.id(), "[backend] client closed"));

            FrameReader::new(link, handlers).run()?;
            Ok(())
        },
    );

    let client_thread = thread::spawn(move || -> io::Result<()> {
        let mut client = TcpStream::connect(public_addr)?;
        client.write_all(b"GET / HTTP/1.1\r\nHost: demo.local\r\n\r\n")?;
        client.shutdown(std::net::Shutdown::Write)
    });

    let (mut accepted, _) = public.accept()?;
    let desc = Descriptor::from_endpoint(&socket_to_addr(&accepted)?)
        .with_service("http")
        .with_name("demo.local");
    info!(id = %desc.addr, "[front-end] relaying client");

    let mut writer = FrameWriter::new(TcpStream::connect(backend_addr)?, desc);
    writer.send_connection()?;
    io::copy(&mut accepted, &mut writer)?;
    writer.send_end()?;
    drop(writer);

    client_thread
        .join()
        .expect("client thread should not panic")?;
    backend_thread
        .join()
        .expect("backend thread should not panic")
        .map_err(|err| err.to_string())?;
    Ok(())
}

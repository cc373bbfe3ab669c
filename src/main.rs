use log::{info, Level, Metadata, Record};
use srcon::client::Client;
use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

struct SimpleLogger;

impl log::Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let _ = log::set_logger(&SimpleLogger).map(|()| log::set_max_level(log::LevelFilter::Info));

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| String::from("127.0.0.1"));
    let port = args.next().map(|p| p.parse()).transpose()?.unwrap_or(27015);
    let password = args.next();

    let mut client = Client::connect(&host, port, password.as_deref()).await?;
    info!("connected to {}:{}", host, port);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        if command.is_empty() {
            continue;
        }
        match client.command(command).await? {
            Some(response) => println!("{}", response.body()),
            None => println!("command didn't give a response"),
        }
    }

    client.shutdown().await;
    info!("bye");
    Ok(())
}

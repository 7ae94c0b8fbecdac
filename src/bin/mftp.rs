use clap::Parser;
use color_eyre::Result;

use mftp::client::Client;

/// Interactive client for the mftp file transfer protocol.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Enable debug logging.
    #[clap(short, long)]
    debug: bool,

    /// Hostname of the mftp server to connect to.
    hostname: String,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    if args.debug && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    let client = Client::connect(&args.hostname)?;
    client.run()
}

use clap::Parser;
use color_eyre::Result;

/// Server for the mftp file transfer protocol.
#[derive(Parser, Debug)]
#[clap(version, about, long_about = None)]
struct Args {
    /// Enable debug logging.
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    if args.debug && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::init();

    mftp::server::serve()
}

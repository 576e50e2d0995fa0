//! Print the multicast endpoint from a config file

use clap::Parser;
use semshm::config::DEFAULT_CONFIG_PATH;
use semshm::MulticastConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multicast", about = "Show the configured multicast endpoint")]
struct Args {
    /// Config file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    path: PathBuf,
}

fn main() {
    let args = Args::parse();

    match MulticastConfig::load(&args.path) {
        Ok(cfg) => {
            println!("addr: {}", cfg.addr);
            println!("port: {}", cfg.port);
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }
}

use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tether-server", about = "Real-time chat coordination gateway")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "tether.toml")]
    pub config: PathBuf,

    /// Override the bind address from the config file.
    #[arg(long)]
    pub bind: Option<String>,
}

//! Process-level CLI arguments, layered over the TOML config in
//! `config.rs` (`SPEC_FULL.md` §D). CLI flags and their `env` fallbacks
//! take precedence over the corresponding TOML field when both are set.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "electric-server", about = "Electric Satellite replication broker")]
pub struct Cli {
    #[arg(long, env = "ELECTRIC_CONFIG_PATH", default_value = "/etc/electric/server.toml")]
    pub config: PathBuf,

    /// Overrides `server.bind` from the config file.
    #[arg(long, env = "ELECTRIC_BIND")]
    pub bind: Option<String>,
}

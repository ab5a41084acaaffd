//! Process entrypoint options (C9), trimmed of the original P2P
//! identity/listen-address/genesis-file concerns this was ported from.

use {clap::Parser, std::path::PathBuf};

#[derive(Debug, Parser)]
#[clap(version, about)]
pub struct CliOpts {
  #[clap(short, long, help = "path to a TOML configuration file")]
  pub config: Option<PathBuf>,

  #[clap(
    short,
    long,
    help = "directory holding the embedded store's on-disk files",
    default_value = "./data"
  )]
  pub data_dir: PathBuf,

  #[clap(
    short,
    long,
    parse(from_occurrences),
    help = "Use verbose output (-vv very verbose output)"
  )]
  pub verbose: u64,
}

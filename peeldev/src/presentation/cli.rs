use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "peeler",
    version,
    about = "Unpack legacy Macintosh archives (BinHex, MacBinary, StuffIt, Compact Pro)",
    long_about = None
)]
pub struct Cli {
    /// Archive or encoded file to unpack
    pub archive: PathBuf,

    /// Destination directory, created if missing
    #[arg(default_value = ".")]
    pub output_dir: PathBuf,
}

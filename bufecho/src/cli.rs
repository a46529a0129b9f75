use std::path::PathBuf;

use clap::Parser;

/// Mark a byte buffer and hand back a fresh one, in process or from inside wasm guests
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Blueprint describing the guests to run
    pub blueprint: Option<PathBuf>,

    /// Call `hello` in process on these bytes, e.g. `--input 1,2,3,4`
    #[clap(short, long, value_delimiter = ',')]
    pub input: Option<Vec<u8>>,

    /// Just load and validate the guests of the blueprint, terminate then
    #[clap(short, long)]
    pub only_validate: bool,

    /// Require every guest to load successfully
    #[clap(short, long)]
    pub strict: bool,
}

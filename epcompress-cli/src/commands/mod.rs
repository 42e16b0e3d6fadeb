//! Command implementations for the epcompress CLI.

pub mod compress;
pub mod extract;
pub mod info;
pub mod sfx;

pub use compress::cmd_compress;
pub use extract::cmd_extract;
pub use info::cmd_info;
pub use sfx::{SfxSettings, cmd_sfx};
pub use test::cmd_test;

use epcompress::Profile;
use std::path::PathBuf;

/// Settings of the compressing commands.
#[derive(Debug, Clone)]
pub struct CompressSettings {
    pub profile: Profile,
    pub level: Option<u8>,
    pub params_file: Option<PathBuf>,
    pub raw: bool,
}

/// Settings of the decoding commands.
#[derive(Debug, Clone)]
pub struct DecodeSettings {
    /// Forced profile, or `None` to detect it.
    pub profile: Option<Profile>,
    pub raw: bool,
}

//! epcompress CLI - optimizing compressor for Enterprise 128 programs
//!
//! Compresses files with the M0, M2 and M3 profiles, builds self-extracting
//! EXOS programs and extracts or tests compressed files.

mod commands;
mod utils;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use epcompress::Profile;
use epcompress_sfx::ExosFileType;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "epcompress")]
#[command(
    author,
    version,
    about = "Optimizing LZ77 compressor for Enterprise 128 programs"
)]
#[command(long_about = "
epcompress packs programs and data for the Enterprise 128 with one of three
stream profiles (m0, m2, m3) and can wrap the result into a self-extracting
EXOS program. EXOS headers on input files are recognized and stripped unless
--raw is given.

Examples:
  epcompress compress game.com
  epcompress compress -p m2 -l 5 data1.bin data2.bin
  epcompress sfx --sfx-modules ./modules game.com -o game_sfx.com
  epcompress extract game.com.epc -o game.com
  epcompress test *.epc
  epcompress info --json game_sfx.com
")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress files
    #[command(alias = "c")]
    Compress {
        /// Files to compress
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file (single input only; default: <file>.epc)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: CompressOptions,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Extract compressed files
    #[command(alias = "x")]
    Extract {
        /// Files to extract
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output file (single input only; default: <file> without .epc)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: DecodeOptions,
    },

    /// Test compressed files
    #[command(alias = "t")]
    Test {
        /// Files to test
        #[arg(required = true)]
        files: Vec<PathBuf>,

        #[command(flatten)]
        options: DecodeOptions,
    },

    /// Build a self-extracting EXOS program
    Sfx {
        /// Program or extension to compress
        input: PathBuf,

        /// Output file (default: <file>.sfx)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: CompressOptions,

        /// Directory holding the decompressor module binaries
        #[arg(long, value_name = "DIR")]
        sfx_modules: PathBuf,

        /// File type for input without an EXOS header
        #[arg(long = "type", value_enum, default_value = "program")]
        file_type: FileTypeArg,

        /// Disable the decompressor border effects
        #[arg(long)]
        no_border_fx: bool,

        /// Restore memory paging and the stack pointer after decompression
        #[arg(long)]
        cleanup: bool,

        /// Hide progress bars
        #[arg(long)]
        no_progress: bool,
    },

    /// Show information about compressed files
    #[command(alias = "i")]
    Info {
        /// Files to inspect
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Do not interpret EXOS headers
        #[arg(long)]
        raw: bool,

        /// Output as JSON (machine-readable)
        #[arg(short, long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Options shared by the compressing commands.
#[derive(Args, Debug, Clone)]
struct CompressOptions {
    /// Stream profile
    #[arg(short, long, value_enum, default_value = "m3")]
    profile: ProfileArg,

    /// Compression level (1-9)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=9))]
    level: Option<u8>,

    /// JSON file with compression parameters
    #[arg(long, value_name = "FILE")]
    params: Option<PathBuf>,

    /// Do not strip EXOS headers from the input
    #[arg(long)]
    raw: bool,
}

/// Options shared by the decoding commands.
#[derive(Args, Debug, Clone)]
struct DecodeOptions {
    /// Stream profile (detected when omitted)
    #[arg(short, long, value_enum)]
    profile: Option<ProfileArg>,

    /// Do not interpret EXOS headers
    #[arg(long)]
    raw: bool,
}

/// Stream profile argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProfileArg {
    /// Huffman codes, delta matches, recent-offset cache
    M0,
    /// Slot codes with byte-aligned literals
    M2,
    /// Gamma codes, unpacks in place (single block)
    M3,
}

impl From<ProfileArg> for Profile {
    fn from(arg: ProfileArg) -> Self {
        match arg {
            ProfileArg::M0 => Profile::M0,
            ProfileArg::M2 => Profile::M2,
            ProfileArg::M3 => Profile::M3,
        }
    }
}

/// EXOS file type argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FileTypeArg {
    /// New application program (type 5)
    Program,
    /// System extension (type 6)
    Extension,
}

impl From<FileTypeArg> for ExosFileType {
    fn from(arg: FileTypeArg) -> Self {
        match arg {
            FileTypeArg::Program => ExosFileType::Program,
            FileTypeArg::Extension => ExosFileType::Extension,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Compress {
            files,
            output,
            options,
            no_progress,
        } => commands::cmd_compress(&files, output.as_deref(), &options.settings(), !no_progress),
        Commands::Extract {
            files,
            output,
            options,
        } => commands::cmd_extract(&files, output.as_deref(), &options.settings()),
        Commands::Test { files, options } => commands::cmd_test(&files, &options.settings()),
        Commands::Sfx {
            input,
            output,
            options,
            sfx_modules,
            file_type,
            no_border_fx,
            cleanup,
            no_progress,
        } => commands::cmd_sfx(
            &input,
            output.as_deref(),
            &commands::SfxSettings {
                compress: options.settings(),
                modules: sfx_modules,
                file_type: file_type.into(),
                border_effects: !no_border_fx,
                cleanup,
            },
            !no_progress,
        ),
        Commands::Info { files, raw, json } => commands::cmd_info(&files, raw, json),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "epcompress", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

impl CompressOptions {
    fn settings(&self) -> commands::CompressSettings {
        commands::CompressSettings {
            profile: self.profile.into(),
            level: self.level,
            params_file: self.params.clone(),
            raw: self.raw,
        }
    }
}

impl DecodeOptions {
    fn settings(&self) -> commands::DecodeSettings {
        commands::DecodeSettings {
            profile: self.profile.map(Profile::from),
            raw: self.raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_compress() {
        let cli = Cli::try_parse_from(["epcompress", "c", "-p", "m2", "-l", "5", "--raw", "a.bin", "b.bin"]).unwrap();
        match cli.command {
            Commands::Compress { files, options, .. } => {
                assert_eq!(files.len(), 2);
                assert_eq!(options.profile, ProfileArg::M2);
                assert_eq!(options.level, Some(5));
                assert!(options.raw);
            }
            _ => panic!("expected compress"),
        }
        assert!(Cli::try_parse_from(["epcompress", "compress", "-l", "10", "a.bin"]).is_err());
    }

    #[test]
    fn test_parse_sfx() {
        let cli = Cli::try_parse_from([
            "epcompress",
            "sfx",
            "--sfx-modules",
            "mods",
            "--no-border-fx",
            "--type",
            "extension",
            "ext.bin",
        ])
        .unwrap();
        match cli.command {
            Commands::Sfx {
                options,
                file_type,
                no_border_fx,
                cleanup,
                ..
            } => {
                assert_eq!(options.profile, ProfileArg::M3);
                assert_eq!(file_type, FileTypeArg::Extension);
                assert!(no_border_fx);
                assert!(!cleanup);
            }
            _ => panic!("expected sfx"),
        }
    }
}

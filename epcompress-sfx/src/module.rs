//! Decompressor module images.
//!
//! A self-extracting file is built around a Z80 decompressor assembled for
//! one profile and a set of options. The machine code is not part of this
//! crate: callers supply it as a [`ModuleSet`], typically loaded from a
//! directory of binaries named after [`ModuleKey::file_name`].

use crate::exos::ExosFileType;
use epcompress_core::error::Result;
use epcompress_core::traits::Profile;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Options that select a decompressor variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SfxOptions {
    /// Flash the border while decompressing.
    pub border_effects: bool,
    /// Restore the machine state before starting the program.
    pub cleanup: bool,
    /// Verify the stream checksum before decompressing (M0 only).
    pub checksum_check: bool,
}

impl Default for SfxOptions {
    fn default() -> Self {
        Self {
            border_effects: true,
            cleanup: false,
            checksum_check: false,
        }
    }
}

/// Identifies one decompressor module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    /// Profile the module decompresses.
    pub profile: Profile,
    /// File type of the self-extracting output.
    pub file_type: ExosFileType,
    /// Variant options.
    pub options: SfxOptions,
}

impl ModuleKey {
    /// Build a key, dropping the options a variant does not have.
    ///
    /// Extension modules come in a single variant per profile, and only M0
    /// decompressors can check the stream checksum.
    pub fn new(profile: Profile, file_type: ExosFileType, options: SfxOptions) -> Self {
        let options = match file_type {
            ExosFileType::Extension => SfxOptions::default(),
            ExosFileType::Program => SfxOptions {
                checksum_check: options.checksum_check && profile == Profile::M0,
                ..options
            },
        };
        Self {
            profile,
            file_type,
            options,
        }
    }

    /// Every distinct module key.
    pub fn all() -> impl Iterator<Item = ModuleKey> {
        let programs = Profile::DETECTION_ORDER.into_iter().flat_map(|profile| {
            (0..8u8).map(move |bits| {
                Self::new(
                    profile,
                    ExosFileType::Program,
                    SfxOptions {
                        border_effects: bits & 1 == 0,
                        cleanup: bits & 2 != 0,
                        checksum_check: bits & 4 != 0,
                    },
                )
            })
        });
        let extensions = Profile::DETECTION_ORDER
            .into_iter()
            .map(|profile| Self::new(profile, ExosFileType::Extension, SfxOptions::default()));
        let mut seen = HashSet::new();
        programs.chain(extensions).filter(move |key| seen.insert(*key))
    }

    /// File name of the module binary, e.g. `sfx_m3_noborderfx.bin`.
    pub fn file_name(&self) -> String {
        let id = self.profile.id();
        match self.file_type {
            ExosFileType::Extension => format!("extsfx_m{id}.bin"),
            ExosFileType::Program => {
                let mut name = format!("sfx_m{id}");
                if !self.options.border_effects {
                    name.push_str("_noborderfx");
                }
                if self.options.cleanup {
                    name.push_str("_cleanup");
                }
                if self.options.checksum_check {
                    name.push_str("_crc");
                }
                name.push_str(".bin");
                name
            }
        }
    }
}

/// Decompressor module images indexed by [`ModuleKey`].
///
/// Program images start with the little-endian size of their loader part;
/// extension images are plain code with a fixed 42-byte loader.
#[derive(Debug, Clone, Default)]
pub struct ModuleSet {
    modules: HashMap<ModuleKey, Vec<u8>>,
}

impl ModuleSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a module image.
    pub fn insert(&mut self, key: ModuleKey, image: Vec<u8>) {
        self.modules.insert(key, image);
    }

    /// Look up a module image.
    pub fn get(&self, key: &ModuleKey) -> Option<&[u8]> {
        self.modules.get(key).map(Vec::as_slice)
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Load every module binary found in `dir`.
    ///
    /// Missing files are skipped.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let mut set = Self::new();
        for key in ModuleKey::all() {
            let path = dir.join(key.file_name());
            if !path.is_file() {
                continue;
            }
            let image = fs::read(&path)?;
            debug!("loaded SFX module {} ({} bytes)", path.display(), image.len());
            set.insert(key, image);
        }
        Ok(set)
    }
}

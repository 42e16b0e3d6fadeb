//! # epcompress SFX
//!
//! Self-extracting Enterprise 128 files. A compressed stream is embedded in
//! an EXOS program (type 5) or system extension (type 6) together with a
//! Z80 decompressor, so the file unpacks itself when loaded.
//!
//! ## File layout
//!
//! ```text
//! header  = 00 type len:16le 00*12        (len = code + payload)
//! file    = header loader payload rest
//! loader  = ... 0E 80 18 FA end:16le clen:16le     (program)
//!         | 40 bytes clen:16le                      (extension)
//! ```
//!
//! Programs unpack their blocks at their load addresses (0x0100 upwards),
//! extensions unpack a raw stream at 0xC00A.
//!
//! ## Example
//!
//! ```rust
//! use epcompress::{CompressionParameters, Profile, compress};
//! use epcompress_sfx::{ExosFileType, ModuleKey, ModuleSet, SfxOptions, unwrap_file, wrap};
//!
//! // Stand-in decompressor: a 42-byte loader and 150 bytes of code.
//! let mut modules = ModuleSet::new();
//! let key = ModuleKey::new(Profile::M3, ExosFileType::Extension, SfxOptions::default());
//! modules.insert(key, vec![0u8; 192]);
//!
//! let data = b"EXOS extension EXOS extension EXOS extension".to_vec();
//! let stream = compress(Profile::M3, &data, CompressionParameters::default()).unwrap();
//! let sfx = wrap(&stream, Some(Profile::M3), ExosFileType::Extension, SfxOptions::default(), &modules).unwrap();
//!
//! let unpacked = unwrap_file(&sfx, None).unwrap();
//! assert_eq!(unpacked.data(), &data[..]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod exos;
pub mod module;
mod wrap;

pub use exos::{ExosFileType, ExosHeader, HEADER_LEN, strip_header};
pub use module::{ModuleKey, ModuleSet, SfxOptions};
pub use wrap::{EXTENSION_LOADER_LEN, LOADER_SIGNATURE, Unwrapped, find_loader_end, unwrap, unwrap_file, wrap};

//! nandtags - NAND Flash Tags Compatibility Layer
//!
//! Reads and writes filesystem chunks on small-page NAND using the legacy
//! 16-byte spare layout: packed 8-byte tags with their own single-bit ECC,
//! Hamming ECC over each 256-byte half of the data area, and bit-count
//! tolerant deleted/bad markers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        TagsHandler                              │
//! │     write_chunk_tags · read_chunk_tags · mark_bad · query_block │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐    ┌──────────────┐    ┌──────────────┐       │
//! │  │  Tags codec  │    │  Spare map   │    │   Chunk I/O  │       │
//! │  │  (ecc/tags)  │───▶│ (nand/spare) │───▶│ (nand/chunk) │       │
//! │  └──────────────┘    └──────────────┘    └──────┬───────┘       │
//! │                                                 │ data ECC,     │
//! │                                                 │ retirement    │
//! ├─────────────────────────────────────────────────┼───────────────┤
//! │                     NandDriver                  ▼               │
//! │              (hardware driver or MemNand)                       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use nandtags::{Device, DeviceConfig, ExtendedTags, MemNand};
//!
//! let config = DeviceConfig::default();
//! let nand = MemNand::for_config(&config);
//! let mut device = Device::new(config, nand).unwrap();
//!
//! let data = vec![0x5A; 512];
//! device
//!     .write_chunk_tags(40, Some(&data), &ExtendedTags::new(7, 1, 512, 0))
//!     .unwrap();
//!
//! let mut tags = ExtendedTags::default();
//! let mut buf = vec![0; 512];
//! device.read_chunk_tags(40, Some(&mut buf), Some(&mut tags)).unwrap();
//! assert!(tags.chunk_used);
//! assert_eq!(tags.object_id, 7);
//! ```
//!
//! # Modules
//!
//! - [`bits`] - Bit counting for marker tests
//! - [`config`] - Device geometry and ECC mode
//! - [`ecc`] - Tag ECC and data Hamming ECC
//! - [`error`] - Error types
//! - [`nand`] - Spare layout, driver port, chunk I/O and the RAM simulator
//! - [`tagscompat`] - Chunk tag operations

pub mod bits;
pub mod config;
pub mod ecc;
pub mod error;
pub mod nand;
pub mod tagscompat;

// Re-export commonly used types
pub use config::DeviceConfig;
pub use ecc::{Correction, DataEcc, HammingEcc, Tags, TagsEccOutcome};
pub use error::{Error, Result};
pub use nand::{
    BlockInfo, BlockInfoTable, Device, EccResult, EccStats, MemNand, NandDriver, NandGeometry,
    NandSpare, Spare,
};
pub use tagscompat::{BlockQuery, BlockState, ExtendedTags, TagsHandler};

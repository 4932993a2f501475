//! Error Correcting Codes
//!
//! Two independent codes protect every chunk:
//!
//! ```text
//! ┌──────────────────────────── chunk ─────────────────────────────┐
//! │  data area (512 bytes)             │  spare area (16 bytes)    │
//! │  ┌──────────────┬──────────────┐   │  ┌──────┬──────┬──────┐   │
//! │  │  half 0      │  half 1      │   │  │ tags │ ecc1 │ ecc2 │   │
//! │  │  256 bytes   │  256 bytes   │   │  └──┬───┴──┬───┴──┬───┘   │
//! │  └──────┬───────┴──────┬───────┘   │     │      │      │       │
//! └─────────┼──────────────┼───────────┴─────┼──────┼──────┼───────┘
//!           │              └─────────────────┼──────┼──────┘
//!           └────────────────────────────────┼──────┘
//!                                   tag ecc (inside tags)
//! ```
//!
//! # Components
//!
//! - **Tags** (`tags.rs`): the packed 8-byte tag record and its 12-bit
//!   position-XOR code, correcting one bit per record.
//! - **Data** (`data.rs`): the [`DataEcc`] port and the [`HammingEcc`]
//!   implementation over 256-byte blocks.

pub mod data;
pub mod tags;

#[cfg(test)]
mod proptest;

pub use data::{Correction, DataEcc, HammingEcc, ECC_BLOCK_SIZE, ECC_CODE_SIZE};
pub use tags::{calc_tags_ecc, check_tags_ecc, Tags, TagsEccOutcome, TAGS_BYTES};

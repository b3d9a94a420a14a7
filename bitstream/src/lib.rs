//! Byte and bit packing primitives for the snaprep replication protocol.
//!
//! This crate provides [`BitWriter`] and [`BitReader`], the buffer abstraction
//! every snapshot payload, handshake event and ack table is written through.
//! It is designed for bounded, panic-free operation with explicit error handling.
//!
//! # Design Principles
//!
//! - **No unsafe code** - Safety is paramount.
//! - **Bounded operations** - All reads are bounds-checked.
//! - **Fixed widths** - Integers and floats are little-endian and byte aligned;
//!   there are no varints so field offsets stay computable.
//! - **No domain knowledge** - This crate knows nothing about snapshots or fields.
//!
//! # Example
//!
//! ```
//! use bitstream::{BitReader, BitWriter};
//!
//! let mut writer = BitWriter::new();
//! writer.write_u16(42).unwrap();
//! writer.write_str("WorldData").unwrap();
//! writer.write_bit(true);
//!
//! let bytes = writer.finish();
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_u16().unwrap(), 42);
//! assert_eq!(reader.read_str().unwrap(), "WorldData");
//! assert!(reader.read_bit().unwrap());
//! ```

mod error;
mod reader;
mod writer;

pub use error::{BitError, BitResult};
pub use reader::BitReader;
pub use writer::{BitWriter, MAX_U16_LEN};

//! Bit-level wire codec, frame codec, opcode catalog and validation for the
//! realm protocol. Pure, synchronous and free of any I/O: the connection
//! runtime (`realm-server`) owns sockets, tasks and timers and calls into
//! this crate for encoding/decoding only.

pub mod bits;
pub mod error;
pub mod frame;
pub mod opcode;
pub mod validate;

pub use bits::{BitReader, BitWriter};
pub use error::{CodecError, FrameError, ValidationError};
pub use frame::{frame, parse_frames};
pub use opcode::{display_name, from_wire, to_wire, Opcode, Symbol};

//! Low-level primitives underneath the microcache codec.
//!
//! Includes byte and bit level encoders, tile sealing and the scratch
//! reuse cache shared by decoding threads.

/// Bit-level writer/reader and statistical integer codes.
///
/// The entropy-coding layer of the wire format: bounded values, var bits,
/// noisy numbers, predicted values and sorted id arrays.
pub mod bits;

/// Byte-level utilities and encoding/decoding.
///
/// Varints and a bounds-checked cursor used by the intermediate link records.
pub mod bytes;

/// Scratch reuse across threads.
pub mod concurrency;

/// CRC32 sealing of encoded tiles.
pub mod frame;

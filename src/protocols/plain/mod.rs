//! Plain protocol implementation.
//!
//! The client sends arbitrary bytes; the server logs them as text and
//! sends nothing back. The connection is closed after one read.
//!
//! ```text
//! Request:  any bytes, up to the read capacity
//! Response: none
//! ```

pub mod handler;

pub use handler::process;

//! Shared wire types for procchain.
//!
//! Three families live here: the payloads the external process agent emits
//! (`upstream`), the descriptor of a single OS process (`process`), and the
//! JSON shapes served by the HTTP API (`api`). Keeping them in one crate lets
//! both the server and any client decode the same structures.

mod api;
mod primitives;
mod process;
mod upstream;

pub use api::*;
pub use primitives::*;
pub use process::*;
pub use upstream::*;

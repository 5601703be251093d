//! The two RPC transports (§4.4.2): a line-oriented eval channel and a
//! length-prefixed framed channel. Both speak the same envelope
//! (`crate::envelope::Envelope`); only the wire encoding differs.

pub mod eval;
pub mod framed;

pub use eval::EvalChild;
pub use framed::FramedChild;

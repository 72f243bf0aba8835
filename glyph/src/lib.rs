//! Building blocks for property-reflective MMO protocol stacks.
//!
//! Glyph is a small collection of crates that together make up the
//! client/server substrate of a KingsIsle-style networking stack: a
//! bit-addressed buffer layer, a reflective object-property system with
//! binary/JSON/XML serializers, a DML record and message-catalog layer,
//! and a framed session transport with handshake and heartbeats. This
//! crate re-exports the pieces under one roof; it provides no behavior
//! of its own.

#[doc(inline)]
pub use glyph_bits as bits;

#[doc(inline)]
pub use glyph_dml as dml;

#[doc(inline)]
pub use glyph_network as network;

#[doc(inline)]
pub use glyph_object as object;

//! Source-level values.
//!
//! Literal words compile to [`value::Value`]s in the constant pool; the same
//! type is what the reference VM computes with.

pub mod value;

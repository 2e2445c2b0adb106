//! # Value Codec
//!
//! This module implements the serialization layer shared by every cache tier:
//! a closed dynamic [`Value`] union and a versioned, self-describing envelope
//! around its JSON encoding.
//!
//! ## Features
//!
//! - **Structure preservation**: bytes, tuples and sets survive the JSON
//!   substrate through small shape tags, so `unbundle(bundle(v)) == v` for
//!   every supported shape, nested combinations included
//! - **Format versioning**: every envelope carries an explicit format
//!   version; unknown versions fail decoding loudly instead of being
//!   misread as data
//!
//! ## Example
//!
//! ```rust
//! use tiercache::bundle::{bundle, unbundle, Value};
//!
//! let value = Value::map([
//!     ("name", Value::from("demo")),
//!     ("tags", Value::set([Value::from(1), Value::from(2)])),
//! ]);
//! let bytes = bundle(&value)?;
//! assert_eq!(unbundle(&bytes)?, value);
//! # Ok::<(), tiercache::CacheError>(())
//! ```

pub mod envelope;
pub mod value;

pub use envelope::{bundle, bundle_versioned, unbundle, unbundle_versioned, FORMAT_VERSION};
pub use value::Value;

//! Model transcoder: converts typed domain records to and from the JSON shape
//! exchanged with the time-tracking API.
//!
//! Every record declares a [`RecordSchema`] (field name, shape, required flag)
//! through [`WireRecord`]. Decoding validates against that schema before any
//! value reaches a typed field:
//! - identifier fields must be UUID strings, dates must be `YYYY-MM-DD`;
//!   both fail with a [`DecodeError`] rather than passing the raw string on
//! - unknown wire fields are dropped
//! - absent or null optional fields decode to `None`
//! - a missing required field is reported by its wire name

mod codec;
pub mod envelope;
mod naming;
mod schema;

pub use codec::{decode, decode_list, encode, parse_date, DecodeError, EncodeError};
pub use naming::{to_domain_case, to_wire_case};
pub use schema::{FieldShape, FieldSpec, RecordSchema, WireRecord};

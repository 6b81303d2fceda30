//! # Types de données UPnP
//!
//! Types intégrés de l'UPnP Device Architecture, leur sérialisation texte
//! canonique et leur représentation Rust.
//!
//! - [`StateVarType`] : le type déclaré (`<dataType>` d'un SCPD)
//! - [`StateValue`] : une valeur typée
//! - [`Csv`] : listes séparées par des virgules
//! - [`InvalidValueError`] : valeur mal formée ou hors contraintes
//!
//! ```
//! use pmoupnpcore::variable_types::{StateValue, StateVarType};
//!
//! let v = StateValue::from_string("42", &StateVarType::UI2).unwrap();
//! assert_eq!(v, StateValue::UI2(42));
//! assert_eq!(v.to_string(), "42");
//!
//! let b = StateValue::from_string("yes", &StateVarType::Boolean).unwrap();
//! assert_eq!(b.to_string(), "1");
//! ```

mod conversions;
mod csv;
mod errors;
mod type_methods;
mod value_methods;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

pub use csv::Csv;
pub use errors::InvalidValueError;
pub use type_methods::UpnpVarType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVarType {
    UI1,        // Unsigned 8-bit integer
    UI2,        // Unsigned 16-bit integer
    UI4,        // Unsigned 32-bit integer
    I1,         // Signed 8-bit integer
    I2,         // Signed 16-bit integer
    I4,         // Signed 32-bit integer
    Int,        // Synonymous with i4
    R4,         // 32-bit floating point
    R8,         // 64-bit floating point
    Number,     // Synonymous with r8
    Fixed14_4,  // Fixed-point decimal
    Float,      // Floating point, same range as r4
    Char,       // Single Unicode character
    String,     // Character string
    Boolean,    // Boolean value
    BinBase64,  // Base64-encoded binary
    BinHex,     // Hex-encoded binary
    Date,       // Date (YYYY-MM-DD)
    DateTime,   // DateTime without timezone
    DateTimeTZ, // DateTime with timezone
    Time,       // Time without timezone
    TimeTZ,     // Time with timezone
    UUID,       // Universally unique identifier
    URI,        // Uniform Resource Identifier
}

/// Valeur typée d'une variable d'état ou d'un argument d'action.
///
/// Les variantes binaires contiennent les octets décodés ; l'encodage
/// (base64 ou hexadécimal) n'intervient qu'à la sérialisation.
#[derive(Clone, Debug)]
pub enum StateValue {
    UI1(u8),
    UI2(u16),
    UI4(u32),
    I1(i8),
    I2(i16),
    I4(i32),
    Int(i32),
    R4(f32),
    R8(f64),
    Number(f64),
    Fixed14_4(f64),
    Float(f32),
    Char(char),
    String(String),
    Boolean(bool),
    BinBase64(Vec<u8>),
    BinHex(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTZ(DateTime<FixedOffset>),
    Time(NaiveTime),
    TimeTZ(NaiveTime, FixedOffset),
    UUID(Uuid),
    URI(Url),
}

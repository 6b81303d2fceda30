use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use url::Url;
use uuid::Uuid;

use crate::variable_types::StateValue;

macro_rules! impl_from_native {
    ($($native:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$native> for StateValue {
                fn from(value: $native) -> Self {
                    StateValue::$variant(value)
                }
            }
        )*
    };
}

impl_from_native! {
    u8 => UI1,
    u16 => UI2,
    u32 => UI4,
    i8 => I1,
    i16 => I2,
    i32 => I4,
    f32 => R4,
    f64 => R8,
    char => Char,
    String => String,
    bool => Boolean,
    Vec<u8> => BinBase64,
    NaiveDate => Date,
    NaiveDateTime => DateTime,
    DateTime<FixedOffset> => DateTimeTZ,
    NaiveTime => Time,
    Uuid => UUID,
    Url => URI,
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        StateValue::String(value.to_string())
    }
}

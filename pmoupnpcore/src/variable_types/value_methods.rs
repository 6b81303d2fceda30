use std::cmp::Ordering;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use url::Url;
use uuid::Uuid;

use crate::variable_types::{InvalidValueError, StateValue, StateVarType, UpnpVarType};

/// Valeur absolue maximale (exclue) d'un `fixed.14.4`
const FIXED_14_4_LIMIT: f64 = 1e14;

impl StateValue {
    /// Parse la forme texte canonique d'une valeur selon le type déclaré.
    ///
    /// Une chaîne vide n'est acceptée que pour `string`. Les booléens
    /// acceptent `1/0/true/false/yes/no` sans distinction de casse.
    pub fn from_string(s: &str, var_type: &StateVarType) -> Result<Self, InvalidValueError> {
        let err = |reason: &dyn fmt::Display| InvalidValueError::malformed(*var_type, s, reason);

        let t = s.trim();
        if t.is_empty() && !var_type.is_string() {
            return Err(err(&"empty value"));
        }

        match var_type {
            StateVarType::UI1 => t.parse().map(StateValue::UI1).map_err(|e| err(&e)),
            StateVarType::UI2 => t.parse().map(StateValue::UI2).map_err(|e| err(&e)),
            StateVarType::UI4 => t.parse().map(StateValue::UI4).map_err(|e| err(&e)),
            StateVarType::I1 => t.parse().map(StateValue::I1).map_err(|e| err(&e)),
            StateVarType::I2 => t.parse().map(StateValue::I2).map_err(|e| err(&e)),
            StateVarType::I4 => t.parse().map(StateValue::I4).map_err(|e| err(&e)),
            StateVarType::Int => t.parse().map(StateValue::Int).map_err(|e| err(&e)),
            StateVarType::R4 => t.parse().map(StateValue::R4).map_err(|e| err(&e)),
            StateVarType::Float => t.parse().map(StateValue::Float).map_err(|e| err(&e)),
            StateVarType::R8 => t.parse().map(StateValue::R8).map_err(|e| err(&e)),
            StateVarType::Number => t.parse().map(StateValue::Number).map_err(|e| err(&e)),
            StateVarType::Fixed14_4 => {
                let v: f64 = t.parse().map_err(|e| err(&e))?;
                if !v.is_finite() || v.abs() >= FIXED_14_4_LIMIT {
                    return Err(err(&"more than 14 integer digits"));
                }
                Ok(StateValue::Fixed14_4(v))
            }
            StateVarType::Boolean => match t.to_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(StateValue::Boolean(true)),
                "0" | "false" | "no" => Ok(StateValue::Boolean(false)),
                _ => Err(err(&"expected 1, 0, true, false, yes or no")),
            },
            StateVarType::BinBase64 => STANDARD
                .decode(t)
                .map(StateValue::BinBase64)
                .map_err(|e| err(&e)),
            StateVarType::BinHex => hex::decode(t).map(StateValue::BinHex).map_err(|e| err(&e)),
            StateVarType::Date => NaiveDate::parse_from_str(t, "%Y-%m-%d")
                .map(StateValue::Date)
                .map_err(|e| err(&e)),
            StateVarType::DateTime => parse_naive_datetime(t)
                .map(StateValue::DateTime)
                .ok_or_else(|| err(&"expected YYYY-MM-DD[Thh:mm:ss]")),
            StateVarType::DateTimeTZ => DateTime::parse_from_rfc3339(t)
                .or_else(|_| DateTime::parse_from_str(t, "%Y-%m-%dT%H:%M:%S%z"))
                .map(StateValue::DateTimeTZ)
                .map_err(|e| err(&e)),
            StateVarType::Time => parse_naive_time(t)
                .map(StateValue::Time)
                .ok_or_else(|| err(&"expected hh:mm:ss")),
            StateVarType::TimeTZ => parse_time_tz(t)
                .map(|(time, offset)| StateValue::TimeTZ(time, offset))
                .ok_or_else(|| err(&"expected hh:mm:ss followed by Z or +hh:mm")),
            StateVarType::UUID => Uuid::parse_str(t.trim_start_matches("uuid:"))
                .map(StateValue::UUID)
                .map_err(|e| err(&e)),
            StateVarType::URI => Url::parse(t).map(StateValue::URI).map_err(|e| err(&e)),
            StateVarType::String => Ok(StateValue::String(s.to_string())),
            StateVarType::Char => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(StateValue::Char(c)),
                    _ => Err(err(&"expected exactly one character")),
                }
            }
        }
    }

    /// Valeur par défaut d'un type : zéro, chaîne vide, epoch...
    pub fn default_for(var_type: &StateVarType) -> StateValue {
        let epoch = NaiveDate::default();
        match var_type {
            StateVarType::UI1 => StateValue::UI1(0),
            StateVarType::UI2 => StateValue::UI2(0),
            StateVarType::UI4 => StateValue::UI4(0),
            StateVarType::I1 => StateValue::I1(0),
            StateVarType::I2 => StateValue::I2(0),
            StateVarType::I4 => StateValue::I4(0),
            StateVarType::Int => StateValue::Int(0),
            StateVarType::R4 => StateValue::R4(0.0),
            StateVarType::R8 => StateValue::R8(0.0),
            StateVarType::Number => StateValue::Number(0.0),
            StateVarType::Fixed14_4 => StateValue::Fixed14_4(0.0),
            StateVarType::Float => StateValue::Float(0.0),
            StateVarType::Char => StateValue::Char(' '),
            StateVarType::String => StateValue::String(String::new()),
            StateVarType::Boolean => StateValue::Boolean(false),
            StateVarType::BinBase64 => StateValue::BinBase64(Vec::new()),
            StateVarType::BinHex => StateValue::BinHex(Vec::new()),
            StateVarType::Date => StateValue::Date(epoch),
            StateVarType::DateTime => StateValue::DateTime(epoch.and_time(NaiveTime::MIN)),
            StateVarType::DateTimeTZ => {
                StateValue::DateTimeTZ(DateTime::UNIX_EPOCH.fixed_offset())
            }
            StateVarType::Time => StateValue::Time(NaiveTime::MIN),
            StateVarType::TimeTZ => StateValue::TimeTZ(NaiveTime::MIN, utc_offset()),
            StateVarType::UUID => StateValue::UUID(Uuid::nil()),
            StateVarType::URI => Url::parse("about:blank")
                .map(StateValue::URI)
                .unwrap_or_else(|_| StateValue::String(String::new())),
        }
    }

    /// Valeur entière, si la valeur est un entier UPnP ou un booléen.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            StateValue::UI1(v) => Some(*v as i64),
            StateValue::UI2(v) => Some(*v as i64),
            StateValue::UI4(v) => Some(*v as i64),
            StateValue::I1(v) => Some(*v as i64),
            StateValue::I2(v) => Some(*v as i64),
            StateValue::I4(v) | StateValue::Int(v) => Some(*v as i64),
            StateValue::Boolean(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Valeur flottante de tout type numérique.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::R4(v) | StateValue::Float(v) => Some(*v as f64),
            StateValue::R8(v) | StateValue::Number(v) | StateValue::Fixed14_4(v) => Some(*v),
            other => other.as_i64().filter(|_| other.is_integer()).map(|v| v as f64),
        }
    }

    /// Convertit la valeur vers un autre type.
    ///
    /// Entre types numériques, la conversion échoue si la valeur ne tient pas
    /// dans le type cible (ou, vers un entier, si elle n'est pas entière).
    /// Depuis une chaîne, la valeur est parsée. Pour les autres combinaisons,
    /// la forme texte est reparsée dans le type cible.
    pub fn try_cast(&self, target: &StateVarType) -> Result<StateValue, InvalidValueError> {
        if StateVarType::from(self) == *target {
            return Ok(self.clone());
        }

        if self.is_numeric() && target.is_numeric() {
            return self.cast_numeric(target);
        }

        StateValue::from_string(&self.to_string(), target)
    }

    fn cast_numeric(&self, target: &StateVarType) -> Result<StateValue, InvalidValueError> {
        let text = self.to_string();
        let out_of_range = || InvalidValueError::malformed(*target, &text, "does not fit the target type");

        if let Some((min, max)) = target.integer_bounds() {
            let v = match self.as_i64().filter(|_| self.is_integer()) {
                Some(v) => v,
                None => {
                    let f = self.as_f64().ok_or_else(out_of_range)?;
                    if f.fract() != 0.0 || !f.is_finite() {
                        return Err(out_of_range());
                    }
                    f as i64
                }
            };
            if v < min || v > max {
                return Err(out_of_range());
            }
            return Ok(match target {
                StateVarType::UI1 => StateValue::UI1(v as u8),
                StateVarType::UI2 => StateValue::UI2(v as u16),
                StateVarType::UI4 => StateValue::UI4(v as u32),
                StateVarType::I1 => StateValue::I1(v as i8),
                StateVarType::I2 => StateValue::I2(v as i16),
                StateVarType::I4 => StateValue::I4(v as i32),
                _ => StateValue::Int(v as i32),
            });
        }

        let f = self.as_f64().ok_or_else(out_of_range)?;
        match target {
            StateVarType::R4 | StateVarType::Float => {
                if f.is_finite() && f.abs() > f32::MAX as f64 {
                    return Err(out_of_range());
                }
                Ok(if *target == StateVarType::R4 {
                    StateValue::R4(f as f32)
                } else {
                    StateValue::Float(f as f32)
                })
            }
            StateVarType::Fixed14_4 if f.abs() >= FIXED_14_4_LIMIT => Err(out_of_range()),
            StateVarType::Fixed14_4 => Ok(StateValue::Fixed14_4(f)),
            StateVarType::Number => Ok(StateValue::Number(f)),
            _ => Ok(StateValue::R8(f)),
        }
    }
}

fn utc_offset() -> FixedOffset {
    Utc.fix()
}

fn parse_naive_time(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok()
}

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

fn parse_time_tz(s: &str) -> Option<(NaiveTime, FixedOffset)> {
    if let Some(time) = s.strip_suffix('Z') {
        return parse_naive_time(time).map(|t| (t, utc_offset()));
    }
    let split = s.rfind(['+', '-'])?;
    let (time, offset) = s.split_at(split);
    let time = parse_naive_time(time)?;
    let sign = if offset.starts_with('-') { -1 } else { 1 };
    let (h, m) = offset[1..].split_once(':')?;
    let secs = h.parse::<i32>().ok()? * 3600 + m.parse::<i32>().ok()? * 60;
    FixedOffset::east_opt(sign * secs).map(|o| (time, o))
}

fn format_fixed(v: f64) -> String {
    let s = format!("{:.4}", v);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StateValue::UI1(v) => write!(f, "{}", v),
            StateValue::UI2(v) => write!(f, "{}", v),
            StateValue::UI4(v) => write!(f, "{}", v),
            StateValue::I1(v) => write!(f, "{}", v),
            StateValue::I2(v) => write!(f, "{}", v),
            StateValue::I4(v) | StateValue::Int(v) => write!(f, "{}", v),
            StateValue::R4(v) | StateValue::Float(v) => write!(f, "{}", v),
            StateValue::R8(v) | StateValue::Number(v) => write!(f, "{}", v),
            StateValue::Fixed14_4(v) => write!(f, "{}", format_fixed(*v)),
            StateValue::Char(c) => write!(f, "{}", c),
            StateValue::String(s) => write!(f, "{}", s),
            StateValue::Boolean(b) => write!(f, "{}", if *b { "1" } else { "0" }),
            StateValue::BinBase64(bytes) => write!(f, "{}", STANDARD.encode(bytes)),
            StateValue::BinHex(bytes) => write!(f, "{}", hex::encode(bytes)),
            StateValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            StateValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S")),
            StateValue::DateTimeTZ(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%:z")),
            StateValue::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            StateValue::TimeTZ(t, offset) => write!(f, "{}{}", t.format("%H:%M:%S"), offset),
            StateValue::UUID(u) => write!(f, "{}", u),
            StateValue::URI(u) => write!(f, "{}", u),
        }
    }
}

impl PartialEq for StateValue {
    fn eq(&self, other: &Self) -> bool {
        matches!(self.partial_cmp(other), Some(Ordering::Equal))
    }
}

impl PartialOrd for StateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (a, b) if a.is_integer() && b.is_integer() => {
                Some(a.as_i64()?.cmp(&b.as_i64()?))
            }
            (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
            (a, b) if a.is_string() && b.is_string() => Some(a.to_string().cmp(&b.to_string())),
            (StateValue::Boolean(a), StateValue::Boolean(b)) => Some(a.cmp(b)),
            (StateValue::Date(a), StateValue::Date(b)) => Some(a.cmp(b)),
            (StateValue::DateTime(a), StateValue::DateTime(b)) => Some(a.cmp(b)),
            (StateValue::DateTimeTZ(a), StateValue::DateTimeTZ(b)) => Some(a.cmp(b)),
            (StateValue::Time(a), StateValue::Time(b)) => Some(a.cmp(b)),
            (StateValue::TimeTZ(a, oa), StateValue::TimeTZ(b, ob)) => {
                let a = *a - chrono::Duration::seconds(oa.local_minus_utc() as i64);
                let b = *b - chrono::Duration::seconds(ob.local_minus_utc() as i64);
                Some(a.cmp(&b))
            }
            (StateValue::BinBase64(a) | StateValue::BinHex(a),
             StateValue::BinBase64(b) | StateValue::BinHex(b)) => (a == b).then_some(Ordering::Equal),
            (StateValue::UUID(a), StateValue::UUID(b)) => (a == b).then_some(Ordering::Equal),
            (StateValue::URI(a), StateValue::URI(b)) => (a == b).then_some(Ordering::Equal),
            _ => None,
        }
    }
}

//! Typed decoding of [`Message`] values via the [`FromResp3`] trait.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use bytes::Bytes;

use crate::error::{AdapterError, AdapterErrorKind, PathSegment};
use crate::resp3::message::{Attributed, Message};

/// Decode a parsed RESP3 [`Message`] into a typed Rust value.
pub trait FromResp3: Sized {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError>;
}

fn mismatch(msg: &Message, expected: &str) -> AdapterError {
    AdapterError::new(AdapterErrorKind::TypeMismatch, format!("expected {expected}, got {}", msg.kind()))
}

fn unexpected_null(expected: &str) -> AdapterError {
    AdapterError::new(AdapterErrorKind::UnexpectedNull, format!("expected {expected}, got null"))
}

/// A marker type that accepts and discards any reply. Useful for commands whose reply carries no
/// information the caller needs (e.g. `SET` without `GET`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ignore;

impl FromResp3 for Ignore {
    fn from_resp3(_msg: &Message) -> Result<Self, AdapterError> {
        Ok(Ignore)
    }
}

impl FromResp3 for () {
    fn from_resp3(_msg: &Message) -> Result<Self, AdapterError> {
        Ok(())
    }
}

impl FromResp3 for String {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        match msg {
            Message::SimpleString(s) | Message::BigNumber(s) => Ok(s.clone()),
            Message::VerbatimString { text, .. } => Ok(text.clone()),
            Message::BulkString(b) => String::from_utf8(b.clone())
                .map_err(|e| AdapterError::new(AdapterErrorKind::InvalidValue, e.to_string())),
            Message::Null => Err(unexpected_null("string")),
            _ => Err(mismatch(msg, "string")),
        }
    }
}

impl FromResp3 for Vec<u8> {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        match msg {
            Message::BulkString(b) => Ok(b.clone()),
            Message::SimpleString(s) | Message::BigNumber(s) => Ok(s.clone().into_bytes()),
            Message::VerbatimString { text, .. } => Ok(text.clone().into_bytes()),
            Message::Null => Err(unexpected_null("bytes")),
            _ => Err(mismatch(msg, "bytes")),
        }
    }
}

impl FromResp3 for Bytes {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        Vec::<u8>::from_resp3(msg).map(Bytes::from)
    }
}

impl FromResp3 for bool {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        match msg {
            Message::Boolean(b) => Ok(*b),
            Message::Integer(i) => Ok(*i != 0),
            Message::Null => Err(unexpected_null("boolean")),
            _ => Err(mismatch(msg, "boolean")),
        }
    }
}

impl FromResp3 for f64 {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        match msg {
            Message::Double(d) => Ok(*d),
            Message::Integer(i) => Ok(*i as f64),
            Message::SimpleString(_) | Message::BulkString(_) => {
                let text = String::from_resp3(msg)?;
                text.parse::<f64>().map_err(|e| AdapterError::new(AdapterErrorKind::InvalidValue, e.to_string()))
            }
            Message::Null => Err(unexpected_null("double")),
            _ => Err(mismatch(msg, "double")),
        }
    }
}

macro_rules! impl_integer {
    ($($t:ty),+ $(,)?) => {
        $(
            impl FromResp3 for $t {
                fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
                    match msg {
                        Message::Integer(i) => <$t>::try_from(*i)
                            .map_err(|_| AdapterError::new(AdapterErrorKind::ValueOutOfRange, format!("{i} out of range for {}", stringify!($t)))),
                        Message::Null => Err(unexpected_null(stringify!($t))),
                        _ => Err(mismatch(msg, stringify!($t))),
                    }
                }
            }
        )+
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl<U: FromResp3> FromResp3 for Option<U> {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        if msg.is_null() {
            Ok(None)
        } else {
            U::from_resp3(msg).map(Some)
        }
    }
}

fn aggregate_items(msg: &Message) -> Result<&[Attributed], AdapterError> {
    match msg {
        Message::Array(items) | Message::Set(items) | Message::Push(items) => Ok(items),
        Message::Null => Err(unexpected_null("array")),
        _ => Err(mismatch(msg, "array")),
    }
}

impl<U: FromResp3> FromResp3 for Vec<U> {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        let items = aggregate_items(msg)?;
        items
            .iter()
            .enumerate()
            .map(|(i, item)| U::from_resp3(&item.value).map_err(|e| e.prepend(PathSegment::Index(i))))
            .collect()
    }
}

fn map_pairs(msg: &Message) -> Result<&[(Attributed, Attributed)], AdapterError> {
    match msg {
        Message::Map(pairs) => Ok(pairs),
        Message::Null => Err(unexpected_null("map")),
        _ => Err(mismatch(msg, "map")),
    }
}

impl<K, V> FromResp3 for HashMap<K, V>
where
    K: FromResp3 + Eq + Hash,
    V: FromResp3,
{
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        let pairs = map_pairs(msg)?;
        let mut out = HashMap::with_capacity(pairs.len());
        for (i, (k, v)) in pairs.iter().enumerate() {
            let key = K::from_resp3(&k.value).map_err(|e| e.prepend(PathSegment::Index(i)))?;
            let value = V::from_resp3(&v.value).map_err(|e| e.prepend(PathSegment::Index(i)))?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

impl<K, V> FromResp3 for BTreeMap<K, V>
where
    K: FromResp3 + Ord,
    V: FromResp3,
{
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        let pairs = map_pairs(msg)?;
        let mut out = BTreeMap::new();
        for (i, (k, v)) in pairs.iter().enumerate() {
            let key = K::from_resp3(&k.value).map_err(|e| e.prepend(PathSegment::Index(i)))?;
            let value = V::from_resp3(&v.value).map_err(|e| e.prepend(PathSegment::Index(i)))?;
            out.insert(key, value);
        }
        Ok(out)
    }
}

impl<U: FromResp3, const N: usize> FromResp3 for [U; N] {
    fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
        let items = aggregate_items(msg)?;
        if items.len() != N {
            return Err(AdapterError::new(
                AdapterErrorKind::SizeMismatch,
                format!("expected {N} elements, got {}", items.len()),
            ));
        }
        let decoded: Vec<U> = items
            .iter()
            .enumerate()
            .map(|(i, item)| U::from_resp3(&item.value).map_err(|e| e.prepend(PathSegment::Index(i))))
            .collect::<Result<_, _>>()?;
        decoded
            .try_into()
            .map_err(|_| AdapterError::new(AdapterErrorKind::InvalidValue, "array conversion failed"))
    }
}

macro_rules! impl_tuple {
    ($($idx:tt => $t:ident),+) => {
        impl<$($t: FromResp3),+> FromResp3 for ($($t,)+) {
            fn from_resp3(msg: &Message) -> Result<Self, AdapterError> {
                let items = aggregate_items(msg)?;
                const LEN: usize = impl_tuple!(@count $($t),+);
                if items.len() != LEN {
                    return Err(AdapterError::new(
                        AdapterErrorKind::SizeMismatch,
                        format!("expected {LEN} elements, got {}", items.len()),
                    ));
                }
                Ok((
                    $(
                        $t::from_resp3(&items[$idx].value).map_err(|e| e.prepend(PathSegment::Index($idx)))?,
                    )+
                ))
            }
        }
    };
    (@count $($t:ident),+) => { <[()]>::len(&[$(impl_tuple!(@unit $t)),+]) };
    (@unit $t:ident) => { () };
}

impl_tuple!(0 => T0);
impl_tuple!(0 => T0, 1 => T1);
impl_tuple!(0 => T0, 1 => T1, 2 => T2);
impl_tuple!(0 => T0, 1 => T1, 2 => T2, 3 => T3);
impl_tuple!(0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4);
impl_tuple!(0 => T0, 1 => T1, 2 => T2, 3 => T3, 4 => T4, 5 => T5);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_accepts_bulk_and_simple() {
        assert_eq!(String::from_resp3(&Message::BulkString(b"hi".to_vec())).unwrap(), "hi");
        assert_eq!(String::from_resp3(&Message::SimpleString("hi".into())).unwrap(), "hi");
    }

    #[test]
    fn integer_range_checks() {
        let err = u8::from_resp3(&Message::Integer(1000)).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::ValueOutOfRange);
    }

    #[test]
    fn option_maps_null_to_none() {
        assert_eq!(Option::<i64>::from_resp3(&Message::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_resp3(&Message::Integer(5)).unwrap(), Some(5));
    }

    #[test]
    fn vec_recurses_with_index_path() {
        let arr = Message::Array(vec![
            Message::Integer(1).into(),
            Message::SimpleString("oops".into()).into(),
        ]);
        let err = Vec::<i64>::from_resp3(&arr).unwrap_err();
        assert_eq!(err.path, vec![PathSegment::Index(1)]);
    }

    #[test]
    fn fixed_array_size_mismatch() {
        let arr = Message::Array(vec![Message::Integer(1).into()]);
        let err = <[i64; 2]>::from_resp3(&arr).unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::SizeMismatch);
    }

    #[test]
    fn tuple_decodes_heterogeneous_elements() {
        let arr = Message::Array(vec![
            Message::Integer(1).into(),
            Message::SimpleString("ok".into()).into(),
        ]);
        let (a, b): (i64, String) = FromResp3::from_resp3(&arr).unwrap();
        assert_eq!(a, 1);
        assert_eq!(b, "ok");
    }

    #[test]
    fn map_decodes_string_keyed_values() {
        let map = Message::Map(vec![(
            Message::SimpleString("k".into()).into(),
            Message::Integer(9).into(),
        )]);
        let decoded: HashMap<String, i64> = FromResp3::from_resp3(&map).unwrap();
        assert_eq!(decoded.get("k"), Some(&9));
    }
}

use std::fmt;
use std::str::from_utf8;

use crate::errors::{ErrorKind, StoreError, StoreResult};

/// Internal low-level store value enum.
#[derive(PartialEq, Eq, Clone)]
pub enum Value {
    /// A nil response from the store.
    Nil,
    /// An integer response.  Note that there are a few situations
    /// in which the store actually returns a string for an integer which
    /// is why this library generally treats integers and strings
    /// the same for all numeric responses.
    Int(i64),
    /// Arbitrary binary data, usually represents a binary-safe string.
    BulkString(Vec<u8>),
    /// A response containing an array with more data.
    Array(Vec<Value>),
    /// A simple string response, without line breaks and not binary safe.
    SimpleString(String),
    /// A status response which represents the string "OK".
    Okay,
    /// A boolean response. Scripted operations that degrade after a backend
    /// failure report `Boolean(false)`.
    Boolean(bool),
}

impl Value {
    /// The outcome reported by a scripted operation that could not reach the
    /// store.
    pub const DEGRADED: Value = Value::Boolean(false);

    /// Returns true if the value is the success sentinel of commands like
    /// `PEXPIRE`, i.e. the integer `1`.
    pub fn is_one(&self) -> bool {
        match self {
            Value::Int(1) | Value::Boolean(true) => true,
            Value::BulkString(bytes) => bytes.as_slice() == b"1",
            Value::SimpleString(s) => s == "1",
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::Nil => write!(fmt, "nil"),
            Value::Int(val) => write!(fmt, "int({val:?})"),
            Value::BulkString(ref val) => match from_utf8(val) {
                Ok(x) => write!(fmt, "bulk-string('{x:?}')"),
                Err(_) => write!(fmt, "binary-data({val:?})"),
            },
            Value::Array(ref values) => write!(fmt, "array({values:?})"),
            Value::SimpleString(ref s) => write!(fmt, "simple-string({s:?})"),
            Value::Okay => write!(fmt, "ok"),
            Value::Boolean(b) => write!(fmt, "boolean({b:?})"),
        }
    }
}

/// Used to convert a value into one or multiple store argument
/// strings.  Most values will produce exactly one item but in
/// some cases it might make sense to produce more than one.
pub trait ToStoreArgs {
    /// This converts the value into a vector of bytes.  Each item
    /// is a single argument.  Most items generate a vector of a
    /// single item.
    ///
    /// The exception to this rule currently are vectors and tuples
    /// of items, which flatten into one argument per element.
    fn to_store_args(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        self.write_store_args(&mut out);
        out
    }

    /// This writes the value into a vector of bytes.  Each item
    /// is a single argument.
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>);
}

macro_rules! itoa_based_to_store_impl {
    ($t:ty) => {
        impl ToStoreArgs for $t {
            fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
                let mut buf = ::itoa::Buffer::new();
                let s = buf.format(*self);
                out.push(s.as_bytes().to_vec())
            }
        }
    };
}

macro_rules! ryu_based_to_store_impl {
    ($t:ty) => {
        impl ToStoreArgs for $t {
            fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
                let mut buf = ::ryu::Buffer::new();
                let s = buf.format(*self);
                out.push(s.as_bytes().to_vec())
            }
        }
    };
}

itoa_based_to_store_impl!(i8);
itoa_based_to_store_impl!(i16);
itoa_based_to_store_impl!(u16);
itoa_based_to_store_impl!(i32);
itoa_based_to_store_impl!(u32);
itoa_based_to_store_impl!(i64);
itoa_based_to_store_impl!(u64);
itoa_based_to_store_impl!(isize);
itoa_based_to_store_impl!(usize);

ryu_based_to_store_impl!(f32);
ryu_based_to_store_impl!(f64);

impl ToStoreArgs for bool {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(if *self { b"1".to_vec() } else { b"0".to_vec() })
    }
}

impl ToStoreArgs for str {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec())
    }
}

impl ToStoreArgs for String {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        out.push(self.as_bytes().to_vec())
    }
}

impl<T: ToStoreArgs> ToStoreArgs for [T] {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        for item in self {
            item.write_store_args(out);
        }
    }
}

impl<T: ToStoreArgs> ToStoreArgs for Vec<T> {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        self.as_slice().write_store_args(out)
    }
}

impl<T: ToStoreArgs, const N: usize> ToStoreArgs for [T; N] {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        self.as_slice().write_store_args(out)
    }
}

impl<T: ToStoreArgs> ToStoreArgs for Option<T> {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        if let Some(ref x) = *self {
            x.write_store_args(out);
        }
    }
}

impl<T: ToStoreArgs + ?Sized> ToStoreArgs for &T {
    fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
        (*self).write_store_args(out)
    }
}

impl ToStoreArgs for () {
    fn write_store_args(&self, _out: &mut Vec<Vec<u8>>) {}
}

macro_rules! to_store_args_for_tuple {
    ($($name:ident),+) => {
        #[doc(hidden)]
        impl<$($name: ToStoreArgs),+> ToStoreArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn write_store_args(&self, out: &mut Vec<Vec<u8>>) {
                let ($(ref $name,)+) = *self;
                $($name.write_store_args(out);)+
            }
        }
    };
}

to_store_args_for_tuple!(A);
to_store_args_for_tuple!(A, B);
to_store_args_for_tuple!(A, B, C);
to_store_args_for_tuple!(A, B, C, D);

/// This trait is used to convert a store value into a more appropriate
/// type.
///
/// The degraded outcome of a scripted operation, `Value::Boolean(false)`,
/// converts to the empty result of the target type: `0`, `false`, `None`
/// or an empty vector.
pub trait FromStoreValue: Sized {
    /// Given a store `Value` this attempts to convert it into the given
    /// destination type.  If that fails because it's not compatible an
    /// appropriate error is generated.
    fn from_store_value(v: &Value) -> StoreResult<Self>;
}

/// A shortcut function to invoke `FromStoreValue::from_store_value`
/// to make the API slightly nicer.
pub fn from_store_value<T: FromStoreValue>(v: &Value) -> StoreResult<T> {
    FromStoreValue::from_store_value(v)
}

impl FromStoreValue for Value {
    fn from_store_value(v: &Value) -> StoreResult<Value> {
        Ok(v.clone())
    }
}

impl FromStoreValue for i64 {
    fn from_store_value(v: &Value) -> StoreResult<i64> {
        match *v {
            Value::Int(val) => Ok(val),
            Value::Boolean(b) => Ok(b as i64),
            Value::BulkString(ref bytes) => match from_utf8(bytes).ok().and_then(|s| s.parse().ok())
            {
                Some(rv) => Ok(rv),
                None => Err(not_convertible_error!(v, "Could not convert from string.")),
            },
            Value::SimpleString(ref s) => match s.parse() {
                Ok(rv) => Ok(rv),
                Err(_) => Err(not_convertible_error!(v, "Could not convert from string.")),
            },
            _ => Err(not_convertible_error!(v, "Response type not convertible to i64.")),
        }
    }
}

impl FromStoreValue for bool {
    fn from_store_value(v: &Value) -> StoreResult<bool> {
        match *v {
            Value::Nil => Ok(false),
            Value::Int(val) => Ok(val != 0),
            Value::Boolean(b) => Ok(b),
            Value::Okay => Ok(true),
            Value::SimpleString(ref s) if s == "1" => Ok(true),
            Value::SimpleString(ref s) if s == "0" => Ok(false),
            Value::BulkString(ref bytes) if bytes.as_slice() == b"1" => Ok(true),
            Value::BulkString(ref bytes) if bytes.as_slice() == b"0" => Ok(false),
            _ => Err(not_convertible_error!(v, "Response type not bool compatible.")),
        }
    }
}

impl FromStoreValue for String {
    fn from_store_value(v: &Value) -> StoreResult<String> {
        match *v {
            Value::BulkString(ref bytes) => Ok(from_utf8(bytes)
                .map_err(|_| {
                    StoreError::from((ErrorKind::TypeError, "Invalid UTF-8 in string response"))
                })?
                .to_string()),
            Value::Okay => Ok("OK".to_string()),
            Value::SimpleString(ref s) => Ok(s.clone()),
            Value::Int(val) => Ok(val.to_string()),
            _ => Err(not_convertible_error!(v, "Response type not string compatible.")),
        }
    }
}

impl<T: FromStoreValue> FromStoreValue for Option<T> {
    fn from_store_value(v: &Value) -> StoreResult<Option<T>> {
        match *v {
            Value::Nil | Value::Boolean(false) => Ok(None),
            _ => FromStoreValue::from_store_value(v).map(Some),
        }
    }
}

impl<T: FromStoreValue> FromStoreValue for Vec<T> {
    fn from_store_value(v: &Value) -> StoreResult<Vec<T>> {
        match *v {
            Value::Array(ref items) => items.iter().map(FromStoreValue::from_store_value).collect(),
            Value::Nil | Value::Boolean(false) => Ok(vec![]),
            _ => Err(not_convertible_error!(v, "Response type not vector compatible.")),
        }
    }
}

//! Typed element buffers and their on-disk encoding

use crate::core::dtype::{Dtype, Value};
use std::ops::Range;

/// A run of elements of one type, held in memory
#[derive(Debug, Clone, PartialEq)]
pub enum Buffer {
    Char(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Str(Vec<String>),
}

macro_rules! each_buffer {
    ($buf:expr, $v:ident => $body:expr) => {
        match $buf {
            Buffer::Char($v) => $body,
            Buffer::Short($v) => $body,
            Buffer::Int($v) => $body,
            Buffer::Float($v) => $body,
            Buffer::Double($v) => $body,
            Buffer::Str($v) => $body,
        }
    };
}

impl Buffer {
    /// Zero-filled buffer of `len` elements
    pub fn new(dtype: Dtype, len: usize) -> Self {
        match dtype {
            Dtype::Char => Buffer::Char(vec![0; len]),
            Dtype::Short => Buffer::Short(vec![0; len]),
            Dtype::Int => Buffer::Int(vec![0; len]),
            Dtype::Float => Buffer::Float(vec![0.0; len]),
            Dtype::Double => Buffer::Double(vec![0.0; len]),
            Dtype::FixedString(_) | Dtype::VarString => Buffer::Str(vec![String::new(); len]),
        }
    }

    pub fn len(&self) -> usize {
        each_buffer!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reset every slot to its zero value
    pub fn reset(&mut self) {
        each_buffer!(self, v => v.iter_mut().for_each(|x| *x = Default::default()))
    }

    /// Release the slots entirely
    pub fn release(&mut self) {
        each_buffer!(self, v => {
            v.clear();
            v.shrink_to_fit();
        })
    }

    /// Grow or shrink to `len` slots, zero-filling new ones
    pub fn resize(&mut self, len: usize) {
        each_buffer!(self, v => v.resize(len, Default::default()))
    }

    pub fn get(&self, idx: usize) -> Option<Value> {
        Some(match self {
            Buffer::Char(v) => Value::Char(*v.get(idx)?),
            Buffer::Short(v) => Value::Short(*v.get(idx)?),
            Buffer::Int(v) => Value::Int(*v.get(idx)?),
            Buffer::Float(v) => Value::Float(*v.get(idx)?),
            Buffer::Double(v) => Value::Double(*v.get(idx)?),
            Buffer::Str(v) => Value::Str(v.get(idx)?.clone()),
        })
    }

    /// Store `value` at `idx`; false if the value does not fit this buffer
    pub fn set(&mut self, idx: usize, value: Value) -> bool {
        match (self, value) {
            (Buffer::Char(v), Value::Char(x)) if idx < v.len() => v[idx] = x,
            (Buffer::Short(v), Value::Short(x)) if idx < v.len() => v[idx] = x,
            (Buffer::Int(v), Value::Int(x)) if idx < v.len() => v[idx] = x,
            (Buffer::Float(v), Value::Float(x)) if idx < v.len() => v[idx] = x,
            (Buffer::Double(v), Value::Double(x)) if idx < v.len() => v[idx] = x,
            (Buffer::Str(v), Value::Str(x)) if idx < v.len() => v[idx] = x,
            _ => return false,
        }
        true
    }

    pub fn strings(&self) -> Option<&[String]> {
        match self {
            Buffer::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn strings_mut(&mut self) -> Option<&mut [String]> {
        match self {
            Buffer::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Encode `range` with a fixed-width `dtype` (anything but `VarString`)
    pub fn encode(&self, range: Range<usize>, dtype: Dtype) -> Vec<u8> {
        let mut out = Vec::with_capacity(range.len() * dtype.width());
        match self {
            Buffer::Char(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Buffer::Short(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Buffer::Int(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Buffer::Float(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Buffer::Double(v) => v[range].iter().for_each(|x| out.extend_from_slice(&x.to_le_bytes())),
            Buffer::Str(v) => {
                let width = dtype.width();
                for s in &v[range] {
                    let field = truncate_utf8(s, width);
                    out.extend_from_slice(field.as_bytes());
                    out.resize(out.len() + width - field.len(), 0);
                }
            }
        }
        out
    }

    /// Decode fixed-width elements from `bytes` into slots starting at `at`
    pub fn decode(&mut self, at: usize, dtype: Dtype, bytes: &[u8]) {
        let width = dtype.width();
        let chunks = bytes.chunks_exact(width);
        match self {
            Buffer::Char(v) => decode_into(&mut v[at..], chunks, |b| i8::from_le_bytes([b[0]])),
            Buffer::Short(v) => decode_into(&mut v[at..], chunks, |b| i16::from_le_bytes([b[0], b[1]])),
            Buffer::Int(v) => decode_into(&mut v[at..], chunks, |b| i32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            Buffer::Float(v) => decode_into(&mut v[at..], chunks, |b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
            Buffer::Double(v) => decode_into(&mut v[at..], chunks, |b| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(b);
                f64::from_le_bytes(raw)
            }),
            Buffer::Str(v) => decode_into(&mut v[at..], chunks, |b| {
                let end = b.iter().position(|&c| c == 0).unwrap_or(b.len());
                String::from_utf8_lossy(&b[..end]).into_owned()
            }),
        }
    }
}

fn decode_into<'a, T>(slots: &mut [T], chunks: std::slice::ChunksExact<'a, u8>, f: impl Fn(&'a [u8]) -> T) {
    for (slot, chunk) in slots.iter_mut().zip(chunks) {
        *slot = f(chunk);
    }
}

/// Longest prefix of `s` that fits in `width` bytes without splitting a character
fn truncate_utf8(s: &str, width: usize) -> &str {
    if s.len() <= width {
        return s;
    }
    let mut end = width;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Rust types usable with the typed vector accessors
pub trait Element: Clone + Default + Sized {
    /// Name used in type-conflict errors
    const NAME: &'static str;

    /// Whether vectors of `dtype` hold this type
    fn accepts(dtype: Dtype) -> bool;

    fn slots(buf: &Buffer) -> Option<&[Self]>;

    fn slots_mut(buf: &mut Buffer) -> Option<&mut [Self]>;

    fn into_buffer(values: Vec<Self>) -> Buffer;

    fn from_buffer(buf: Buffer) -> Option<Vec<Self>>;
}

macro_rules! numeric_element {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl Element for $ty {
            const NAME: &'static str = $name;

            fn accepts(dtype: Dtype) -> bool {
                dtype == Dtype::$variant
            }

            fn slots(buf: &Buffer) -> Option<&[Self]> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn slots_mut(buf: &mut Buffer) -> Option<&mut [Self]> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_buffer(values: Vec<Self>) -> Buffer {
                Buffer::$variant(values)
            }

            fn from_buffer(buf: Buffer) -> Option<Vec<Self>> {
                match buf {
                    Buffer::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

numeric_element!(i8, Char, "char");
numeric_element!(i16, Short, "short");
numeric_element!(i32, Int, "int");
numeric_element!(f32, Float, "float");
numeric_element!(f64, Double, "double");

impl Element for String {
    const NAME: &'static str = "string";

    fn accepts(dtype: Dtype) -> bool {
        dtype.is_string()
    }

    fn slots(buf: &Buffer) -> Option<&[Self]> {
        buf.strings()
    }

    fn slots_mut(buf: &mut Buffer) -> Option<&mut [Self]> {
        buf.strings_mut()
    }

    fn into_buffer(values: Vec<Self>) -> Buffer {
        Buffer::Str(values)
    }

    fn from_buffer(buf: Buffer) -> Option<Vec<Self>> {
        match buf {
            Buffer::Str(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_encode_decode() {
        let buf = Buffer::Double(vec![1.5, -2.25, 1e300]);
        let bytes = buf.encode(0..3, Dtype::Double);
        assert_eq!(bytes.len(), 24);

        let mut out = Buffer::new(Dtype::Double, 4);
        out.decode(1, Dtype::Double, &bytes);
        assert_eq!(out, Buffer::Double(vec![0.0, 1.5, -2.25, 1e300]));
    }

    #[test]
    fn test_fixed_string_padding_and_trim() {
        let buf = Buffer::Str(vec!["ab".into(), "toolongvalue".into(), String::new()]);
        let bytes = buf.encode(0..3, Dtype::FixedString(4));
        assert_eq!(&bytes[..4], b"ab\0\0");
        assert_eq!(&bytes[4..8], b"tool");
        assert_eq!(&bytes[8..], &[0u8; 4]);

        let mut out = Buffer::new(Dtype::FixedString(4), 3);
        out.decode(0, Dtype::FixedString(4), &bytes);
        assert_eq!(out.strings().unwrap(), &["ab", "tool", ""]);
    }

    #[test]
    fn test_fixed_string_keeps_char_boundaries() {
        let buf = Buffer::Str(vec!["héllo".into()]);
        // 'é' is two bytes; a 2-byte field cannot hold "hé"
        let bytes = buf.encode(0..1, Dtype::FixedString(2));
        assert_eq!(&bytes, b"h\0");
    }

    #[test]
    fn test_set_rejects_wrong_type() {
        let mut buf = Buffer::new(Dtype::Int, 2);
        assert!(buf.set(1, Value::Int(9)));
        assert!(!buf.set(0, Value::Float(1.0)));
        assert!(!buf.set(5, Value::Int(1)));
        assert_eq!(buf.get(1), Some(Value::Int(9)));
        assert_eq!(buf.get(2), None);

        buf.reset();
        assert_eq!(buf.get(1), Some(Value::Int(0)));
    }

    #[test]
    fn test_element_dispatch() {
        assert!(f32::accepts(Dtype::Float));
        assert!(!f32::accepts(Dtype::Double));
        assert!(String::accepts(Dtype::VarString));
        assert!(String::accepts(Dtype::FixedString(3)));

        let buf = i16::into_buffer(vec![3, 4]);
        assert_eq!(i16::slots(&buf), Some(&[3i16, 4][..]));
        assert!(i32::slots(&buf).is_none());
        assert_eq!(i16::from_buffer(buf), Some(vec![3, 4]));
    }
}

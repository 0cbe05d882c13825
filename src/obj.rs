use std::{cmp::Ordering, sync::Arc};
use once_cell::sync::Lazy;
use super::skiplist::SkipList;


///
/// Value objects.
///


/// Our shared "common" objects
///
pub static CRLF: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("\r\n".to_string()) })
});
pub static OK: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("+OK\r\n".to_string()) })
});
pub static PONG: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("+PONG\r\n".to_string()) })
});
pub static C_ZERO: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw(":0\r\n".to_string()) })
});
pub static C_ONE: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw(":1\r\n".to_string()) })
});
pub static NULL_BULK: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("$-1\r\n".to_string()) })
});
pub static EMPTY_MULTI_BULK: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("*0\r\n".to_string()) })
});
pub static WRONG_TYPE_ERR: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("-ERR Operation against a key holding the wrong kind of value\r\n".to_string()) })
});
pub static SYNTAX_ERR: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("-ERR syntax error\r\n".to_string()) })
});

/// Range sentinels. The comparator recognizes these two objects by pointer
/// identity and orders them below/above every real value, so their string
/// payload never takes part in a comparison.
pub static MIN_SENTINEL: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("minstring".to_string()) })
});
pub static MAX_SENTINEL: Lazy<Arc<Object>> = Lazy::new(|| {
    Arc::new(Object::String { ptr: StringValue::Raw("maxstring".to_string()) })
});


/// Object types
#[derive(Clone)]
pub enum Object {
    String {
        ptr: StringValue,
    },
    SkipList {
        sl: SkipList,
    },
}
impl Object {
    pub fn is_string(&self) -> bool {
        match self {
            Self::String { ptr: _ } => true,
            _ => false,
        }
    }

    pub fn as_key(&self) -> &str {
        self.string().unwrap().string().unwrap()
    }

    pub fn string(&self) -> Option<&StringValue> {
        match self {
            Self::String { ptr } => { Some(ptr) },
            _ => { None },
        }
    }

    pub fn is_skiplist(&self) -> bool {
        match self {
            Self::SkipList { sl: _ } => true,
            _ => false,
        }
    }

    pub fn skiplist(&self) -> Option<&SkipList> {
        match self {
            Self::SkipList { sl } => { Some(sl) },
            _ => { None },
        }
    }

    pub fn skiplist_mut(&mut self) -> Option<&mut SkipList> {
        match self {
            Self::SkipList { sl } => { Some(sl) },
            _ => { None },
        }
    }

    /// Get a decoded version of an encoded object (returned as a new object).
    pub fn get_decoded(&self) -> Object {
        match &self {
            Self::String { ptr } => {
                match ptr {
                    StringValue::Int(n) => {
                        Object::String { ptr: StringValue::Raw(n.to_string()) }
                    },
                    _ => { self.clone() },
                }
            },
            _ => { self.clone() },
        }
    }
}

#[derive(Clone)]
pub enum StringValue {
    Raw(String),        // raw string
    Int(isize),         // encoded as integer
}
impl StringValue {
    pub fn string(&self) -> Option<&str> {
        match self {
            Self::Raw(s) => { Some(s) },
            _ => { None }
        }
    }

    pub fn is_int(&self) -> bool {
        match self {
            Self::Int(_) => true,
            _ => false,
        }
    }
}

pub fn create_string_object(s: &str) -> Arc<Object> {
    Arc::new(Object::String { ptr: StringValue::Raw(s.to_string()) })
}

/// Try to encode a string object in order to save space.
/// Returns a fresh integer-encoded object when the payload round-trips
/// through `isize`, the input object otherwise.
pub fn try_object_encoding(obj: Arc<Object>) -> Arc<Object> {
    match obj.string() {
        Some(StringValue::Raw(s)) => {
            match is_string_representable_as_int(s) {
                Ok(encoded) => {
                    return Arc::new(Object::String { ptr: StringValue::Int(encoded) });
                },
                Err(_) => {},
            }
        },
        _ => {},
    }
    obj
}

/// Check if the string 's' can be represented by a `isize` integer
/// (that is, is a number that fits into `isize` without any other space or
/// character before or after the digits).
fn is_string_representable_as_int(s: &str) -> Result<isize, String> {
    let i: isize;
    match s.parse() {
        Ok(v) => { i = v; },
        Err(e) => { return Err(e.to_string()); },
    }

    // If the number converted back into a string is not identical
    // then it's not possible to encode the string as integer
    if !i.to_string().eq(s) {
        return Err("failed to encode".to_string());
    }
    Ok(i)
}

/// Compare two string objects on their decoded forms, so the two encodings
/// mix freely.
pub fn compare_string_objects(obj1: &Object, obj2: &Object) -> Ordering {
    assert!(obj1.is_string() && obj2.is_string(), "comparing non-string objects");
    obj1.get_decoded().string().unwrap().string().unwrap()
        .cmp(obj2.get_decoded().string().unwrap().string().unwrap())
}

pub fn equal_string_objects(obj1: &Object, obj2: &Object) -> bool {
    if !obj1.is_string() || !obj2.is_string() {
        return false;
    }
    compare_string_objects(obj1, obj2) == Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_test() {
        let o = try_object_encoding(create_string_object("1234"));
        assert!(o.string().unwrap().is_int());
        assert_eq!(o.get_decoded().as_key(), "1234");

        // leading zeros and signs do not round-trip
        assert!(!try_object_encoding(create_string_object("012")).string().unwrap().is_int());
        assert!(!try_object_encoding(create_string_object("+1")).string().unwrap().is_int());
        assert!(!try_object_encoding(create_string_object("1.5")).string().unwrap().is_int());
        assert!(try_object_encoding(create_string_object("-7")).string().unwrap().is_int());
    }

    #[test]
    fn compare_test() {
        let a = create_string_object("abc");
        let b = create_string_object("abd");
        assert_eq!(compare_string_objects(&a, &b), Ordering::Less);
        assert_eq!(compare_string_objects(&b, &a), Ordering::Greater);
        assert!(equal_string_objects(&a, &a));

        // mixed encodings compare on the decoded text
        let enc = try_object_encoding(create_string_object("12"));
        let raw = create_string_object("12");
        assert!(equal_string_objects(&enc, &raw));
        assert_eq!(compare_string_objects(&enc, &create_string_object("2")), Ordering::Less);
    }
}

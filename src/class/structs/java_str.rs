use std::{borrow::Cow, fmt::Debug};

use cesu8_str::java as cesu8_java;

/// Modified UTF-8 text as stored in `CONSTANT_Utf8` entries.
#[derive(Hash, Eq, PartialEq)]
#[repr(transparent)]
pub struct JavaStr {
    inner: [u8],
}

impl JavaStr {
    pub fn new(inner: &[u8]) -> &Self {
        // SAFETY: JavaStr is a transparent wrapper over [u8]
        unsafe { &*(inner as *const [u8] as *const JavaStr) }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }

    /// `None` when the bytes are not valid modified UTF-8.
    pub fn to_str(&self) -> Option<Cow<'_, str>> {
        let java_str = cesu8_java::JavaStr::from_java_cesu8(&self.inner).ok()?;
        Some(cesu8_java::from_java_cesu8(java_str))
    }

    /// Encodes `s` into the modified UTF-8 form used by class files.
    pub fn encode(s: &str) -> Cow<'_, [u8]> {
        match cesu8_java::from_utf8(s) {
            Cow::Borrowed(b) => Cow::Borrowed(b.as_bytes()),
            Cow::Owned(o) => Cow::Owned(o.into_bytes()),
        }
    }
}

impl Debug for JavaStr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_str() {
            Some(s) => Debug::fmt(&s, f),
            None => Debug::fmt(&self.inner, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_is_borrowed() {
        assert!(matches!(JavaStr::encode("rust_object"), Cow::Borrowed(_)));
        let java = JavaStr::new(b"java/lang/Object");
        assert_eq!(java.to_str().unwrap(), "java/lang/Object");
    }

    #[test]
    fn test_nul_uses_two_bytes() {
        let encoded = JavaStr::encode("a\0b");
        assert_eq!(encoded.as_ref(), &[b'a', 0xc0, 0x80, b'b']);
        assert_eq!(JavaStr::new(&encoded).to_str().unwrap(), "a\0b");
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(JavaStr::new(&[0xff, 0xfe]).to_str().is_none());
    }
}

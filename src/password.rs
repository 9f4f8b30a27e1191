//! Archive passwords.

use zeroize::Zeroizing;

/// A password for encrypting or decrypting archive contents.
///
/// The text is wiped from memory when the value is dropped, and `Debug`
/// output never shows it.
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Creates a password from text.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// Returns the password text.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns true for an empty password.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// UTF-16LE bytes, the form 7z key derivation consumes.
    pub fn as_utf16_le(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(
            self.inner
                .encode_utf16()
                .flat_map(|c| c.to_le_bytes())
                .collect(),
        )
    }
}

impl Default for Password {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for Password {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utf16le() {
        let password = Password::new("test");
        assert_eq!(
            password.as_utf16_le().as_slice(),
            &[0x74, 0x00, 0x65, 0x00, 0x73, 0x00, 0x74, 0x00]
        );
        assert_eq!(Password::new("пароль").as_utf16_le().len(), 12);
    }

    #[test]
    fn test_debug_hides_text() {
        let debug = format!("{:?}", Password::new("secret"));
        assert!(!debug.contains("secret"));
    }

    #[test]
    fn test_conversions() {
        let a: Password = "x".into();
        let b: Password = String::from("x").into();
        assert_eq!(a, b);
        assert!(Password::new("").is_empty());
    }
}

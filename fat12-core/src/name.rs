//! 8.3 short names as stored in directory slots.

use std::fmt;
use std::path::Path;

use crate::error::{Fat12Error, Fat12Result};

/// Raw 11-byte directory name: 8 bytes of name, 3 of extension, space-padded.
///
/// Case is kept as provided. Lookups compare all 11 bytes exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShortName([u8; 11]);

impl ShortName {
    /// Wrap raw directory bytes.
    pub fn from_raw(raw: [u8; 11]) -> Self {
        Self(raw)
    }

    /// Raw bytes as written to disk.
    pub fn as_bytes(&self) -> &[u8; 11] {
        &self.0
    }

    /// Build from a display name like `A.TXT` or `KERNEL.BIN`.
    ///
    /// The part before the last dot is padded/truncated to 8 bytes, the part
    /// after it to 3 bytes.
    ///
    /// # Examples
    /// ```
    /// use fat12_core::ShortName;
    /// let name = ShortName::parse("a.txt").unwrap();
    /// assert_eq!(name.as_bytes(), b"a       txt");
    /// assert_eq!(name.to_string(), "a.txt");
    /// ```
    pub fn parse(name: &str) -> Fat12Result<Self> {
        let (stem, ext) = match name.rfind('.') {
            Some(pos) if pos > 0 => (&name[..pos], &name[pos + 1..]),
            _ => (name, ""),
        };
        Self::from_parts(stem, ext).ok_or_else(|| Fat12Error::InvalidName(name.to_string()))
    }

    /// Derive the stored name from a host path: file stem and extension,
    /// directories dropped.
    ///
    /// # Examples
    /// ```
    /// use fat12_core::ShortName;
    /// use std::path::Path;
    /// let name = ShortName::from_host_path(Path::new("build/loader.bin")).unwrap();
    /// assert_eq!(name.as_bytes(), b"loader  bin");
    /// ```
    pub fn from_host_path(path: &Path) -> Fat12Result<Self> {
        let invalid = || Fat12Error::InvalidName(path.display().to_string());
        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(invalid)?;
        let ext = match path.extension() {
            Some(ext) => ext.to_str().ok_or_else(invalid)?,
            None => "",
        };
        Self::from_parts(stem, ext).ok_or_else(invalid)
    }

    fn from_parts(stem: &str, ext: &str) -> Option<Self> {
        // 0x00 and 0xE5 in the first byte would read back as an empty slot.
        let first = *stem.as_bytes().first()?;
        if first == b' ' || first == 0xE5 || !stem.is_ascii() || !ext.is_ascii() {
            return None;
        }
        if stem.bytes().chain(ext.bytes()).any(|b| b < 0x20) {
            return None;
        }

        let mut raw = [b' '; 11];
        for (dst, src) in raw[..8].iter_mut().zip(stem.bytes()) {
            *dst = src;
        }
        for (dst, src) in raw[8..].iter_mut().zip(ext.bytes()) {
            *dst = src;
        }
        Some(Self(raw))
    }

    /// Name part without padding.
    pub fn stem(&self) -> String {
        trim_field(&self.0[..8])
    }

    /// Extension without padding.
    pub fn extension(&self) -> String {
        trim_field(&self.0[8..])
    }
}

fn trim_field(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_end_matches(' ').to_string()
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ext = self.extension();
        if ext.is_empty() {
            write!(f, "{}", self.stem())
        } else {
            write!(f, "{}.{}", self.stem(), ext)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        assert_eq!(ShortName::parse("A.TXT").unwrap().as_bytes(), b"A       TXT");
        assert_eq!(ShortName::parse("KERNEL.BIN").unwrap().as_bytes(), b"KERNEL  BIN");
    }

    #[test]
    fn test_parse_truncation() {
        let name = ShortName::parse("verylongname.extension").unwrap();
        assert_eq!(name.as_bytes(), b"verylongext");
        assert_eq!(name.to_string(), "verylong.ext");
    }

    #[test]
    fn test_parse_no_extension() {
        let name = ShortName::parse("README").unwrap();
        assert_eq!(name.as_bytes(), b"README     ");
        assert_eq!(name.to_string(), "README");
    }

    #[test]
    fn test_case_preserved() {
        assert_ne!(ShortName::parse("a.txt").unwrap(), ShortName::parse("A.TXT").unwrap());
    }

    #[test]
    fn test_rejects_unstorable_names() {
        assert!(ShortName::parse("").is_err());
        assert!(ShortName::parse(" A.TXT").is_err());
        assert!(ShortName::parse("caf\u{e9}.txt").is_err());
    }

    #[test]
    fn test_from_host_path() {
        let name = ShortName::from_host_path(Path::new("/tmp/out/boot.img")).unwrap();
        assert_eq!(name, ShortName::parse("boot.img").unwrap());
        let name = ShortName::from_host_path(Path::new("Makefile")).unwrap();
        assert_eq!(name.as_bytes(), b"Makefile   ");
    }
}

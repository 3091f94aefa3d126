//! Long-name validation and 8.3 short-name synthesis

use crate::error::{FatError, Result};

pub const MAX_LONG_NAME_LEN: usize = 255;

/// Punctuation allowed in short names besides A-Z and 0-9
const SHORT_NAME_PUNCTUATION: &str = "$%'-_@~`!(){}^#&";
/// Extra punctuation a long name may carry on top of the short set
const LONG_NAME_PUNCTUATION: &str = "+,;=[] .";
/// Never valid in any FAT name
const FORBIDDEN: &str = "\"*/:<>?\\|";

/// 8+3 basis for a short name, unpadded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortName {
    pub basis: [String; 2],
    /// Substitution or truncation happened; a numeric tail is needed
    pub lossy: bool,
}

impl ShortName {
    pub fn base(&self) -> &str {
        &self.basis[0]
    }

    pub fn extension(&self) -> &str {
        &self.basis[1]
    }

    /// Space-padded 11-byte on-disk form
    pub fn to_bytes(&self) -> [u8; 11] {
        pad_83(self.base(), self.extension())
    }

    /// On-disk form with a `~N` numeric tail squeezed into the base
    pub fn with_tail(&self, n: u32) -> [u8; 11] {
        let tail = format!("~{}", n);
        let keep = 8usize.saturating_sub(tail.len()).min(self.base().len());
        let base = format!("{}{}", &self.base()[..keep], tail);
        pad_83(&base, self.extension())
    }
}

fn pad_83(base: &str, ext: &str) -> [u8; 11] {
    let mut raw = [b' '; 11];
    for (slot, b) in raw[..8].iter_mut().zip(base.bytes()) {
        *slot = b;
    }
    for (slot, b) in raw[8..].iter_mut().zip(ext.bytes()) {
        *slot = b;
    }
    raw
}

fn is_short_name_char(c: char) -> bool {
    c.is_ascii_uppercase() || c.is_ascii_digit() || SHORT_NAME_PUNCTUATION.contains(c)
}

fn is_long_name_char(c: char) -> bool {
    if (c as u32) < 0x20 || FORBIDDEN.contains(c) {
        return false;
    }
    c.is_alphanumeric()
        || !c.is_ascii()
        || SHORT_NAME_PUNCTUATION.contains(c)
        || LONG_NAME_PUNCTUATION.contains(c)
}

/// Synthesize the 8.3 basis for a long name.
///
/// Uppercases, drops spaces and leading dots, replaces characters a short
/// name cannot hold with `_`, then splits on the last dot and truncates to
/// 8 + 3. Dots inside the base are dropped. `lossy` is set when a
/// substitution or truncation happened.
pub fn short_name(long_name: &str) -> ShortName {
    let mut lossy = false;
    let cleaned: String = long_name
        .to_uppercase()
        .chars()
        .filter(|&c| c != ' ')
        .collect::<String>()
        .trim_start_matches('.')
        .chars()
        .map(|c| {
            if c == '.' || is_short_name_char(c) {
                c
            } else {
                lossy = true;
                '_'
            }
        })
        .collect();

    let (base, ext) = match cleaned.rfind('.') {
        Some(dot) => (cleaned[..dot].replace('.', ""), cleaned[dot + 1..].to_string()),
        None => (cleaned, String::new()),
    };

    let mut base: String = base;
    if base.len() > 8 {
        base.truncate(8);
        lossy = true;
    }
    let mut ext = ext;
    if ext.len() > 3 {
        ext.truncate(3);
        lossy = true;
    }

    ShortName {
        basis: [base, ext],
        lossy,
    }
}

/// Validate and normalize a long name. Trailing spaces and dots are trimmed;
/// leading spaces are part of the name.
pub fn long_name(input: &str) -> Result<String> {
    let name = input.trim_end_matches([' ', '.']);
    if name.is_empty() {
        return Err(FatError::invalid_character(
            input,
            input.chars().next().unwrap_or('.'),
        ));
    }
    if let Some(c) = name.chars().find(|&c| !is_long_name_char(c)) {
        return Err(FatError::invalid_character(input, c));
    }
    let length = name.encode_utf16().count();
    if length > MAX_LONG_NAME_LEN {
        return Err(FatError::name_too_long(input, length));
    }
    Ok(name.to_string())
}

/// True when `name` is stored exactly by its 8.3 form: no long-name
/// records are needed.
pub fn fits_short_name(name: &str) -> bool {
    let short = short_name(name);
    if short.lossy || short.base().is_empty() {
        return false;
    }
    let rendered = if short.extension().is_empty() {
        short.base().to_string()
    } else {
        format!("{}.{}", short.base(), short.extension())
    };
    rendered == name
}

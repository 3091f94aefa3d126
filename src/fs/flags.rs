//! Open modes

use std::fmt;
use std::str::FromStr;

use crate::error::{FatError, Result};

/// Access requested by `open`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    pub append: bool,
    /// Fail with `AlreadyExists` if the path exists
    pub exclusive: bool,
}

impl OpenFlags {
    pub const READ: Self = Self {
        read: true,
        write: false,
        create: false,
        truncate: false,
        append: false,
        exclusive: false,
    };

    /// Parse a mode string: `r`, `r+`, `rs+`, `w`, `wx`, `w+`, `wx+`, `a`,
    /// `ax`, `a+` or `ax+`.
    pub fn parse(mode: &str) -> Result<Self> {
        let mut flags = Self::default();
        match mode {
            "r" => flags.read = true,
            "r+" | "rs+" => {
                flags.read = true;
                flags.write = true;
            }
            "w" | "wx" | "w+" | "wx+" => {
                flags.write = true;
                flags.create = true;
                flags.truncate = true;
            }
            "a" | "ax" | "a+" | "ax+" => {
                flags.write = true;
                flags.create = true;
                flags.append = true;
            }
            _ => return Err(FatError::invalid_flags(mode)),
        }
        if mode.len() > 1 && mode.ends_with('+') {
            flags.read = true;
        }
        flags.exclusive = mode.contains('x');
        Ok(flags)
    }

    /// Any flag that needs a writable volume
    pub fn requires_write(&self) -> bool {
        self.write || self.create || self.truncate || self.append
    }
}

impl FromStr for OpenFlags {
    type Err = FatError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = if self.append {
            "a"
        } else if self.truncate {
            "w"
        } else {
            "r"
        };
        let x = if self.exclusive { "x" } else { "" };
        let plus = match base {
            "r" if self.write => "+",
            "a" | "w" if self.read => "+",
            _ => "",
        };
        write!(f, "{}{}{}", base, x, plus)
    }
}

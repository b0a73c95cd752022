use std::fmt;

/// Failures that can occur while loading or interpreting per-binary
/// metadata, or while asking an [`crate::Architecture`] plugin to do
/// something it doesn't understand.
///
/// This mirrors the manual, dependency-free `Error` enum style used by the
/// lower-level crates in this family rather than a derive-based one: the
/// variants here are few, stable, and read fine spelled out by hand.
#[derive(Debug)]
pub enum Error {
    /// The binary didn't look like one of ours: missing section, bad magic,
    /// wrong version, or an architecture tag we don't recognize.
    BadBinary(&'static str),
    /// A live-value or unwind entry named a register number that the
    /// architecture plugin has no slot for.
    UnknownRegister { arch: crate::Architecture, reg: u16 },
    /// A live-value descriptor's location-kind byte wasn't one of the five
    /// kinds in spec §6 (Register/Direct/Indirect/Constant/ConstIndex).
    UnknownValueKind(u8),
    /// A value-generation program referenced an opcode outside §4.5's set.
    UnknownInstruction(u8),
    /// Mapping or reading the binary's file failed.
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(inner) => Some(inner),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBinary(reason) => write!(f, "not a valid stack-transform binary: {reason}"),
            Self::UnknownRegister { arch, reg } => {
                write!(f, "register {reg} does not exist on {arch:?}")
            }
            Self::UnknownValueKind(kind) => write!(f, "unknown live-value location kind {kind}"),
            Self::UnknownInstruction(op) => {
                write!(f, "unknown value-generation instruction opcode {op}")
            }
            Self::Io(e) => write!(f, "{e}"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! NT-style 32-bit result codes.
//!
//! Cached records carry the status the directory returned so that a cache
//! hit reproduces failures exactly like a live call would. The top two bits
//! hold the severity: `00` success, `01` informational, `10` warning,
//! `11` error.

use std::fmt;

/// A directory result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Status(pub u32);

impl Status {
    pub const OK: Status = Status(0x0000_0000);
    pub const NO_MORE_ENTRIES: Status = Status(0x8000_001A);
    pub const UNSUCCESSFUL: Status = Status(0xC000_0001);
    pub const MORE_PROCESSING_REQUIRED: Status = Status(0xC000_0016);
    pub const NO_MEMORY: Status = Status(0xC000_0017);
    pub const ACCESS_DENIED: Status = Status(0xC000_0022);
    pub const OBJECT_NAME_NOT_FOUND: Status = Status(0xC000_0034);
    pub const NONE_MAPPED: Status = Status(0xC000_0073);
    pub const INVALID_SID: Status = Status(0xC000_0078);
    pub const NO_SUCH_USER: Status = Status(0xC000_0064);
    pub const NO_SUCH_DOMAIN: Status = Status(0xC000_00DF);
    pub const INTERNAL_DB_ERROR: Status = Status(0xC000_0158);
    pub const DOMAIN_CONTROLLER_NOT_FOUND: Status = Status(0xC000_0233);

    pub fn is_ok(self) -> bool {
        self == Status::OK
    }

    /// Error severity (top two bits set). Warnings like `NO_MORE_ENTRIES`
    /// are not errors.
    pub fn is_error(self) -> bool {
        self.0 & 0xC000_0000 == 0xC000_0000
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            Status::OK => "OK",
            Status::NO_MORE_ENTRIES => "NO_MORE_ENTRIES",
            Status::UNSUCCESSFUL => "UNSUCCESSFUL",
            Status::MORE_PROCESSING_REQUIRED => "MORE_PROCESSING_REQUIRED",
            Status::NO_MEMORY => "NO_MEMORY",
            Status::ACCESS_DENIED => "ACCESS_DENIED",
            Status::OBJECT_NAME_NOT_FOUND => "OBJECT_NAME_NOT_FOUND",
            Status::NONE_MAPPED => "NONE_MAPPED",
            Status::INVALID_SID => "INVALID_SID",
            Status::NO_SUCH_USER => "NO_SUCH_USER",
            Status::NO_SUCH_DOMAIN => "NO_SUCH_DOMAIN",
            Status::INTERNAL_DB_ERROR => "INTERNAL_DB_ERROR",
            Status::DOMAIN_CONTROLLER_NOT_FOUND => "DOMAIN_CONTROLLER_NOT_FOUND",
            _ => return None,
        })
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "NT_STATUS_{}", name),
            None => write!(f, "NT_STATUS(0x{:08x})", self.0),
        }
    }
}

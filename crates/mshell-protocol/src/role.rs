//! Connection role tag
//!
//! Every connection to the relay starts with a single unauthenticated byte
//! naming the role of the connecting side. Trust is only established by the
//! secure-channel handshake that follows.

use std::fmt;

/// Role announced by the first byte of a relay connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The machine that executes commands (`mshelld`)
    Target,
    /// An administrator issuing commands (`mshell`)
    Peer,
}

impl Role {
    /// Wire byte for this role
    pub fn as_byte(&self) -> u8 {
        match self {
            Role::Target => b't',
            Role::Peer => b'c',
        }
    }

    /// Parse a role byte; any other value is rejected
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b't' => Some(Role::Target),
            b'c' => Some(Role::Peer),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Target => write!(f, "target"),
            Role::Peer => write!(f, "peer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_bytes() {
        assert_eq!(Role::from_byte(b't'), Some(Role::Target));
        assert_eq!(Role::from_byte(b'c'), Some(Role::Peer));
        assert_eq!(Role::Target.as_byte(), b't');
        assert_eq!(Role::Peer.as_byte(), b'c');
    }

    #[test]
    fn test_unknown_role_byte() {
        assert_eq!(Role::from_byte(b'x'), None);
        assert_eq!(Role::from_byte(0), None);
        assert_eq!(Role::from_byte(b'T'), None);
    }
}

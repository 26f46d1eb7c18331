//! Process-wide machine identity (§3 MachineIdentity).

use std::fmt;

/// The token that authenticates every outbound control-plane call via the
/// `x-machine-id` header. Resolved once from `MACHINE_ID` at startup;
/// absence is a hard configuration failure for anything that needs it.
#[derive(Clone)]
pub struct MachineIdentity(String);

impl MachineIdentity {
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    pub fn from_env() -> Option<Self> {
        std::env::var("MACHINE_ID").ok().and_then(Self::new)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token itself.
        write!(f, "MachineIdentity(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        assert!(MachineIdentity::new("").is_none());
        assert!(MachineIdentity::new("   ").is_none());
    }

    #[test]
    fn non_empty_token_is_kept() {
        let id = MachineIdentity::new("abc123").unwrap();
        assert_eq!(id.as_str(), "abc123");
    }

    #[test]
    fn debug_never_leaks_token() {
        let id = MachineIdentity::new("super-secret").unwrap();
        assert!(!format!("{id:?}").contains("super-secret"));
    }
}

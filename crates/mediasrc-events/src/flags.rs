#![forbid(unsafe_code)]

use bitflags::bitflags;

bitflags! {
    /// Flags for [`EventQueue::retrieve`](crate::EventQueue::retrieve).
    ///
    /// The empty set means "block until an event arrives".
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RetrieveFlags: u8 {
        /// Return [`EventError::NoEvent`](crate::EventError::NoEvent) instead of blocking.
        const NO_WAIT = 0b0000_0001;
    }
}

impl RetrieveFlags {
    /// Whether the caller asked not to block.
    pub fn is_no_wait(self) -> bool {
        self.contains(Self::NO_WAIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_blocks() {
        assert!(!RetrieveFlags::default().is_no_wait());
        assert!(RetrieveFlags::NO_WAIT.is_no_wait());
    }
}

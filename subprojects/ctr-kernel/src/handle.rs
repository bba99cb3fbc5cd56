//! Handle types.
//!
//! A [`Handle`] is a process-local name for a kernel object. Values are only meaningful within the
//! handle table that issued them; the same number may refer to different objects in two processes.
//!
//! Two values never come from a table: the _pseudo-handles_ [`Handle::CURRENT_THREAD`] and
//! [`Handle::CURRENT_PROCESS`]. They are resolved against the calling context instead, see
//! [`PseudoHandle`].

/// A per-process handle to a kernel object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Handle(u32);

impl Handle {
    /// The reserved "no object" handle.
    pub const INVALID: Handle = Handle(0);

    /// Pseudo handle for the current thread
    pub const CURRENT_THREAD: Handle = Handle(0xFFFF8000);

    /// Pseudo handle for the current process
    pub const CURRENT_PROCESS: Handle = Handle(0xFFFF8001);

    /// Converts a raw command buffer word to a [`Handle`].
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Converts the [`Handle`] to a raw command buffer word.
    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns `true` if the handle is not [`Handle::INVALID`].
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Returns `true` if the handle is one of the pseudo-handles.
    #[inline]
    pub const fn is_pseudo(&self) -> bool {
        PseudoHandle::from_handle(*self).is_some()
    }
}

impl PartialEq<u32> for Handle {
    fn eq(&self, other: &u32) -> bool {
        &self.0 == other
    }
}

impl PartialEq<Handle> for u32 {
    fn eq(&self, other: &Handle) -> bool {
        self == &other.0
    }
}

impl From<u32> for Handle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010X}", self.0)
    }
}

/// A handle value that is resolved against the calling context rather than a handle table.
///
/// The IPC translator runs while the _target_ process is current, so pseudo-handles found in a
/// request must be resolved against the thread that built the request. Keeping the check out of
/// the table guarantees pseudo-handles never occupy a table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoHandle {
    /// The calling thread.
    CurrentThread,
    /// The process owning the calling thread.
    CurrentProcess,
}

impl PseudoHandle {
    /// Returns the pseudo-handle named by `handle`, if any.
    #[inline]
    pub const fn from_handle(handle: Handle) -> Option<Self> {
        match handle {
            Handle::CURRENT_THREAD => Some(Self::CurrentThread),
            Handle::CURRENT_PROCESS => Some(Self::CurrentProcess),
            _ => None,
        }
    }

    /// Returns the reserved handle value of this pseudo-handle.
    #[inline]
    pub const fn handle(self) -> Handle {
        match self {
            Self::CurrentThread => Handle::CURRENT_THREAD,
            Self::CurrentProcess => Handle::CURRENT_PROCESS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_handles_are_recognised() {
        assert_eq!(
            PseudoHandle::from_handle(Handle::from_raw(0xFFFF8000)),
            Some(PseudoHandle::CurrentThread)
        );
        assert_eq!(
            PseudoHandle::from_handle(Handle::from_raw(0xFFFF8001)),
            Some(PseudoHandle::CurrentProcess)
        );
        assert_eq!(PseudoHandle::from_handle(Handle::INVALID), None);
        assert_eq!(PseudoHandle::from_handle(Handle::from_raw(0x8001)), None);
    }

    #[test]
    fn invalid_handle_is_zero() {
        assert!(!Handle::INVALID.is_valid());
        assert_eq!(Handle::INVALID, 0u32);
        assert!(Handle::CURRENT_THREAD.is_pseudo());
        assert!(!Handle::from_raw(0x8001).is_pseudo());
    }
}

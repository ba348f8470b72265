//! Local port allocation cursor.
//!
//! A [`PortRange`] hands out local ports for new sockets. Several threads may
//! open sockets at the same time against the same range, so the cursor is
//! read-modify-written under a mutex.

use crate::error::{TransportError, TransportResult};
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy)]
struct Cursor {
    base: u16,
    max: u16,
    current: u16,
}

/// Port allocation cursor over `[base, max]`
///
/// A range with `base == 0` is unconfigured: every allocation returns port 0
/// and the operating system picks an ephemeral port.
#[derive(Debug)]
pub struct PortRange {
    cursor: Mutex<Cursor>,
}

impl PortRange {
    /// Create a cursor over `[base, max]`
    ///
    /// `(0, 0)` yields an unconfigured range.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidPortRange`] when `base > max` or when
    /// only one of the bounds is zero.
    ///
    /// # Examples
    ///
    /// ```
    /// use natscout_transport::PortRange;
    ///
    /// let range = PortRange::new(5000, 5001).unwrap();
    /// assert_eq!(range.next_port(), 5000);
    /// assert_eq!(range.next_port(), 5001);
    /// assert_eq!(range.next_port(), 5000);
    /// ```
    pub fn new(base: u16, max: u16) -> TransportResult<Self> {
        if (base == 0) != (max == 0) || base > max {
            return Err(TransportError::InvalidPortRange { base, max });
        }
        Ok(Self {
            cursor: Mutex::new(Cursor {
                base,
                max,
                current: base,
            }),
        })
    }

    /// Unconfigured range: the OS chooses every port
    #[must_use]
    pub fn any() -> Self {
        Self {
            cursor: Mutex::new(Cursor {
                base: 0,
                max: 0,
                current: 0,
            }),
        }
    }

    fn snapshot(&self) -> Cursor {
        *self.cursor.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether explicit bounds were configured
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.snapshot().base != 0
    }

    /// `(base, max)` when configured
    #[must_use]
    pub fn bounds(&self) -> Option<(u16, u16)> {
        let cursor = self.snapshot();
        (cursor.base != 0).then_some((cursor.base, cursor.max))
    }

    /// Number of distinct ports in the range (1 when unconfigured)
    #[must_use]
    pub fn len(&self) -> usize {
        match self.bounds() {
            Some((base, max)) => usize::from(max - base) + 1,
            None => 1,
        }
    }

    /// Always false; a range holds at least one port
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Take the next port and advance the cursor, wrapping to `base` after `max`
    pub fn next_port(&self) -> u16 {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if cursor.base == 0 {
            return 0;
        }
        let port = cursor.current;
        cursor.current = if cursor.current >= cursor.max {
            cursor.base
        } else {
            cursor.current + 1
        };
        port
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::any()
    }
}

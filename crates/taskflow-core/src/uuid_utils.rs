//! UUID v7 utilities for time-ordered identifiers.
//!
//! Task, notification, user and event ids are all UUIDv7, so they sort by
//! creation time. The in-memory store relies on that for its id tie-break.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use taskflow_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// assert_eq!(id.get_version_num(), 7);
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_version() {
        assert_eq!(new_v7().get_version_num(), 7);
    }

    #[test]
    fn test_v7_ordering() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(a < b);
    }
}

//! Named failure injection (feature: `failpoints`).
//!
//! `fail_point!(name)` expands to nothing unless the feature is enabled. When
//! enabled, it makes the enclosing function return `Error::Debug` while the
//! point is armed.

#[cfg(feature = "failpoints")]
use std::collections::HashSet;
#[cfg(feature = "failpoints")]
use std::sync::Mutex;

#[cfg(feature = "failpoints")]
use once_cell::sync::Lazy;

#[cfg(feature = "failpoints")]
static ARMED: Lazy<Mutex<HashSet<String>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Make `name` fail until it is disarmed.
#[cfg(feature = "failpoints")]
pub fn arm(name: &str) {
    if let Ok(mut armed) = ARMED.lock() {
        armed.insert(name.to_string());
    }
}

#[cfg(feature = "failpoints")]
pub fn disarm(name: &str) {
    if let Ok(mut armed) = ARMED.lock() {
        armed.remove(name);
    }
}

#[cfg(feature = "failpoints")]
pub fn is_armed(name: &str) -> bool {
    ARMED.lock().map(|armed| armed.contains(name)).unwrap_or(false)
}

#[cfg(not(feature = "failpoints"))]
pub fn arm(_name: &str) {}

#[cfg(not(feature = "failpoints"))]
pub fn disarm(_name: &str) {}

#[cfg(not(feature = "failpoints"))]
pub fn is_armed(_name: &str) -> bool {
    false
}

#[cfg(feature = "failpoints")]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {{
        let name: &str = $name;
        if $crate::failpoints::is_armed(name) {
            return Err($crate::__core::Error::Debug(format!(
                "failpoint triggered: {}",
                name
            )));
        }
    }};
}

#[cfg(not(feature = "failpoints"))]
#[macro_export]
macro_rules! fail_point {
    ($name:expr) => {
        // no-op
        let _ = $name;
    };
}

//! Configuration access port trait.
//!
//! Values are looked up by `[section] key` and returned raw. Typed parsing
//! happens in `domain::config_validation` so that a present but malformed
//! value is reported instead of silently replaced by a default.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
}

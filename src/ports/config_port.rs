//! Configuration access port trait.
//!
//! Values come back as raw strings; typing and range checks belong to
//! `domain::config_validation` so that a malformed value is reported rather
//! than replaced by a default.

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    /// All section names present in the configuration, lowercased.
    fn sections(&self) -> Vec<String>;

    fn has_section(&self, section: &str) -> bool {
        self.sections().iter().any(|name| name == section)
    }
}

//! The closed set of package names the backend's own environment owns and
//! the plugin installer must never upgrade (§4.F, §9 "Critical dependency
//! set"). The design notes say this should be configuration, not code, so a
//! port can refresh it as the backend evolves; we keep a sensible default
//! but let callers override it entirely.

use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct CriticalPackages(HashSet<String>);

impl Default for CriticalPackages {
    fn default() -> Self {
        // The backend's pinned numerics / vision / ML stack.
        const DEFAULT: &[&str] = &[
            "torch",
            "torchvision",
            "torchaudio",
            "numpy",
            "pillow",
            "opencv-python",
            "transformers",
            "safetensors",
            "xformers",
            "accelerate",
            "huggingface-hub",
        ];
        Self(DEFAULT.iter().map(|s| s.to_string()).collect())
    }
}

impl CriticalPackages {
    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        Self(names.into_iter().map(|s| s.to_lowercase()).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(&name.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_contains_known_critical_packages() {
        let set = CriticalPackages::default();
        assert!(set.contains("torch"));
        assert!(set.contains("Torch"));
        assert!(set.contains("numpy"));
    }

    #[test]
    fn default_set_excludes_ordinary_packages() {
        let set = CriticalPackages::default();
        assert!(!set.contains("requests"));
    }

    #[test]
    fn custom_set_overrides_default() {
        let set = CriticalPackages::from_names(["foo".to_string()]);
        assert!(set.contains("foo"));
        assert!(!set.contains("torch"));
    }
}

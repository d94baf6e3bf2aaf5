use serde::{Deserialize, Serialize};

/// Persisted scope policy
///
/// Missing fields deserialize to their defaults so older records keep loading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ScopeConfig {
    pub include: Vec<String>,  // ["*.example.com", "api.*.io"]
    pub exclude: Vec<String>,  // ["*.google.com"]
    pub exclude_images: bool,
    #[serde(rename = "excludeCSS")]
    pub exclude_css: bool,
    #[serde(rename = "excludeJS")]
    pub exclude_js: bool,
    pub exclude_fonts: bool,
    pub exclude_media: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_names_and_defaults() {
        let config: ScopeConfig =
            serde_json::from_str(r#"{"include":["*.shop.test"],"excludeJS":true}"#).unwrap();
        assert_eq!(config.include, vec!["*.shop.test"]);
        assert!(config.exclude.is_empty());
        assert!(config.exclude_js);
        assert!(!config.exclude_css);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["excludeCSS"], false);
        assert_eq!(json["excludeImages"], false);
    }
}

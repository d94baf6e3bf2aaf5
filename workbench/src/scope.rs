use crate::error::{WorkbenchError, WorkbenchResult};
use crate::models::settings::ScopeConfig;
use regex::{Regex, RegexBuilder};
use tracing::debug;
use url::Url;

const IMAGE_EXTENSIONS: &str = r"\.(png|jpe?g|gif|bmp|ico|svg|webp|avif|tiff?)$";
const CSS_EXTENSIONS: &str = r"\.css$";
const JS_EXTENSIONS: &str = r"\.(m?js|map)$";
const FONT_EXTENSIONS: &str = r"\.(woff2?|ttf|otf|eot)$";
const MEDIA_EXTENSIONS: &str = r"\.(mp3|mp4|m4a|webm|ogg|oga|wav|flac|avi|mov|mkv)$";

/// Compile a host glob into an anchored, case-insensitive regex
///
/// `*` matches any run of characters; everything else is literal.
fn glob_to_regex(pattern: &str) -> WorkbenchResult<Regex> {
    let body = regex::escape(pattern).replace(r"\*", ".*");
    RegexBuilder::new(&format!("^{}$", body))
        .case_insensitive(true)
        .build()
        .map_err(|e| WorkbenchError::configuration(format!("Invalid scope pattern '{}': {}", pattern, e)))
}

fn compile_patterns(patterns: &[String]) -> WorkbenchResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(glob_to_regex)
        .collect()
}

fn extension_class(pattern: &str) -> WorkbenchResult<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|e| WorkbenchError::configuration(e.to_string()))
}

/// Decides which captured traffic is surfaced to the operator
///
/// Evaluation order: URL parse (fail-open), extension classes, exclude,
/// include.
#[derive(Debug, Clone)]
pub struct ScopeEngine {
    config: ScopeConfig,
    include: Vec<Regex>,
    exclude: Vec<Regex>,
    extensions: Vec<Regex>,
}

impl ScopeEngine {
    pub fn new(config: ScopeConfig) -> WorkbenchResult<Self> {
        let include = compile_patterns(&config.include)?;
        let exclude = compile_patterns(&config.exclude)?;

        let mut extensions = Vec::new();
        for (enabled, class) in [
            (config.exclude_images, IMAGE_EXTENSIONS),
            (config.exclude_css, CSS_EXTENSIONS),
            (config.exclude_js, JS_EXTENSIONS),
            (config.exclude_fonts, FONT_EXTENSIONS),
            (config.exclude_media, MEDIA_EXTENSIONS),
        ] {
            if enabled {
                extensions.push(extension_class(class)?);
            }
        }

        Ok(Self {
            config,
            include,
            exclude,
            extensions,
        })
    }

    /// Everything admitted
    pub fn permissive() -> Self {
        Self {
            config: ScopeConfig::default(),
            include: Vec::new(),
            exclude: Vec::new(),
            extensions: Vec::new(),
        }
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    pub fn admits(&self, url: &str) -> bool {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(url = %url, "Unparseable URL admitted: {}", e);
                return true;
            }
        };

        let path = parsed.path();
        if self.extensions.iter().any(|class| class.is_match(path)) {
            return false;
        }

        let host = parsed.host_str().unwrap_or_default();
        if self.exclude.iter().any(|pattern| pattern.is_match(host)) {
            return false;
        }

        self.include.is_empty() || self.include.iter().any(|pattern| pattern.is_match(host))
    }
}

impl Default for ScopeEngine {
    fn default() -> Self {
        Self::permissive()
    }
}

//! Quill configuration system
//!
//! This crate provides centralized configuration for the Quill editing bridge,
//! loading settings from `quill.toml` with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure for Quill
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct QuillConfig {
    /// Editable-region behaviour pushed to the engine
    pub editor: EditorConfig,
    /// Static asset locations used to stage the embedded surface
    pub resources: ResourceConfig,
    /// Host-side bridge behaviour
    pub bridge: BridgeConfig,
    /// Headless Chrome settings (used by the `cdp` transport)
    pub cdp: CdpConfig,
}

/// Editor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Name of the engine-side global object that receives commands
    pub namespace: String,
    /// Enable spellcheck on the top-level editable region
    pub spellcheck: bool,
    /// Enable autocorrect on the top-level editable region
    pub autocorrect: bool,
    /// Placeholder shown while the document is empty
    pub placeholder: Option<String>,
    /// Document content pushed once the surface reaches `ContentLoading`
    pub initial_html: Option<String>,
}

/// Resource staging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Directory holding the root assets (markup.html, markup.js, ...)
    pub root_dir: PathBuf,
    /// Transient directory the assets are copied into before loading
    pub staging_dir: PathBuf,
    /// Base document loaded into the surface
    pub base_document: String,
    /// Files that must exist in `root_dir` for a surface to start
    pub root_files: Vec<String>,
    /// Optional host-supplied script loaded after `ready`
    pub user_script: Option<PathBuf>,
    /// Optional host-supplied stylesheet loaded after `ready`
    pub user_css: Option<PathBuf>,
}

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Become first responder as soon as the surface is ready
    pub claim_first_responder_on_ready: bool,
    /// How long a driver waits for the lifecycle to reach `Ready`
    pub ready_timeout_ms: u64,
    /// Name of the message handler the engine posts events to
    pub message_handler: String,
}

/// Headless Chrome configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CdpConfig {
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
    /// Run without a visible window
    pub headless: bool,
    /// Explicit Chrome/Chromium executable
    pub chrome_path: Option<PathBuf>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            namespace: "MU".to_string(),
            spellcheck: false,
            autocorrect: true,
            placeholder: None,
            initial_html: None,
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("resources"),
            staging_dir: std::env::temp_dir().join("quill"),
            base_document: "markup.html".to_string(),
            root_files: vec![
                "markup.html".to_string(),
                "markup.css".to_string(),
                "markup.js".to_string(),
            ],
            user_script: None,
            user_css: None,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            claim_first_responder_on_ready: false,
            ready_timeout_ms: 10_000,
            message_handler: "markup".to_string(),
        }
    }
}

impl Default for CdpConfig {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            headless: true,
            chrome_path: None,
        }
    }
}

impl ResourceConfig {
    /// File names of the user assets, as the engine sees them once staged.
    pub fn user_file_names(&self) -> (Option<String>, Option<String>) {
        let name = |p: &Option<PathBuf>| {
            p.as_ref()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
        };
        (name(&self.user_script), name(&self.user_css))
    }
}

impl QuillConfig {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    /// * `path` - Path to the quill.toml configuration file
    ///
    /// # Returns
    /// * `Ok(QuillConfig)` - Successfully loaded configuration
    /// * `Err(String)` - Error message if loading failed
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {}", e))
    }

    /// Load configuration from the default location (quill.toml in the current directory)
    /// or return default configuration if file doesn't exist
    pub fn load_or_default() -> Self {
        Self::load_from_file("quill.toml").unwrap_or_default()
    }

    /// Merge configuration with environment variables
    ///
    /// Environment variables take precedence over configuration file values.
    pub fn merge_with_env(&mut self) {
        // Editor settings
        if let Ok(ns) = std::env::var("QUILL_NAMESPACE") {
            self.editor.namespace = ns;
        }
        if let Ok(val) = std::env::var("QUILL_SPELLCHECK") {
            self.editor.spellcheck = parse_flag(&val);
        }
        if let Ok(val) = std::env::var("QUILL_AUTOCORRECT") {
            self.editor.autocorrect = parse_flag(&val);
        }

        // Resource settings
        if let Ok(dir) = std::env::var("QUILL_RESOURCES_DIR") {
            self.resources.root_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("QUILL_STAGING_DIR") {
            self.resources.staging_dir = PathBuf::from(dir);
        }
        if let Ok(path) = std::env::var("QUILL_USER_SCRIPT") {
            self.resources.user_script = Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var("QUILL_USER_CSS") {
            self.resources.user_css = Some(PathBuf::from(path));
        }

        // Bridge settings
        if let Ok(val) = std::env::var("QUILL_CLAIM_FOCUS") {
            self.bridge.claim_first_responder_on_ready = parse_flag(&val);
        }

        if let Ok(path) = std::env::var("QUILL_CHROME_PATH") {
            self.cdp.chrome_path = Some(PathBuf::from(path));
        }
    }

    /// Load configuration with environment variable overrides
    ///
    /// 1. Load from quill.toml (or use defaults if not found)
    /// 2. Override with environment variables if present
    pub fn load() -> Self {
        let mut config = Self::load_or_default();
        config.merge_with_env();
        config
    }

    /// Attributes applied to the top-level editable region during startup.
    pub fn top_level_attributes(&self) -> serde_json::Value {
        serde_json::json!({
            "contenteditable": true,
            "spellcheck": self.editor.spellcheck,
            "autocorrect": self.editor.autocorrect,
        })
    }
}

fn parse_flag(val: &str) -> bool {
    val == "1" || val.eq_ignore_ascii_case("true")
}

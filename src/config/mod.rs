//! Configuration: TOML settings file and platform paths.

pub mod paths;
pub mod settings;

pub use paths::ConfigPaths;
pub use settings::{
    AudioSettings, ContextSettings, ContextSource, HotkeySettings, HttpSettings, OpenAiSettings,
    ScreenSettings, Settings, TypingSettings,
};

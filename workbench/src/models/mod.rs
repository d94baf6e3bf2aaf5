pub mod settings;

pub use settings::ScopeConfig;

pub mod loader;
pub mod model;
pub mod paths;

pub use loader::{find_config, load, ConfigError};
pub use model::{
    DockerConfig, DockerSettings, GraphiteConfig, LifecycleConfig, LinearConfig, LinearSettings,
    ProjectConfig, ProjectSection, TmuxConfig, TmuxLayout, TmuxSettings,
};

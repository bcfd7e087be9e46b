mod loader;
mod properties;
mod settings;

pub use loader::{default_properties, ConfigLoader, ConfigSource};
pub use properties::Properties;
pub use settings::SessionSettings;

pub mod store;

pub use store::{EngineSettings, default_data_dir, load_settings, save_settings};

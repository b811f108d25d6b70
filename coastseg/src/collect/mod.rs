pub mod files;
pub mod global_variables;
pub mod settings;

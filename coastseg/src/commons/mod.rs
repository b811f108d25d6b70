pub mod dates;
pub mod errors;

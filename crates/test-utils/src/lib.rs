pub mod builders;

pub use builders::{ConfigFileBuilder, ProgramConfigBuilder};

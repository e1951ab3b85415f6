pub mod csv;
pub mod stages;
pub mod text;

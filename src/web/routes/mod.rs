// Route handler modules

pub mod generate;
pub mod model;
pub mod status;

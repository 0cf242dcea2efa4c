pub mod error;
pub mod lowering;
pub mod selection;
pub mod value;

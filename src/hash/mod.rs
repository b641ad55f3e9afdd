mod extendible;

pub use extendible::*;

pub mod package;
pub mod package_history;
pub mod price;
pub mod quote;

pub mod browser;
pub mod capture;
pub mod images;
pub mod logging;
pub mod metadata;
pub mod prompt;
pub mod session;

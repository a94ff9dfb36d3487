pub mod app;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod foreground;

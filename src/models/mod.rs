pub mod event;
pub mod oracle;
pub mod settings;
pub mod suggestion;
pub mod task;

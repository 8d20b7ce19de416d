pub mod event_repository;
pub mod settings_repository;
pub mod task_bank_repository;

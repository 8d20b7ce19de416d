pub mod calendar_provider;
pub mod conflict_builder;
pub mod event_store;
pub mod oracle_service;
pub mod prompt_templates;
pub mod retry_service;
pub mod schedule_utils;
pub mod settings_service;
pub mod slot_finder;
pub mod suggestion_service;
pub mod task_parser;

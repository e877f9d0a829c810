pub mod smtp_notifier;

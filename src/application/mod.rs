pub mod alert_service;
pub mod detection_state;
pub mod dto;
pub mod live_stream;
pub mod ports;
pub mod services;

#[cfg(test)]
pub(crate) mod testing;

//! Servidor de detección de armas: YOLO (ONNX) sobre cámaras en vivo y
//! archivos subidos, con estado global de detección y alertas por email.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;

// Library root: exposes the service wiring so tests can drive it.

pub mod app;

//! Concrete IM channels. Each keeps its SDK types private and implements `ImTransport`.

pub mod telegram;

// Messaging - Lock-free channels between the UI, scheduler and audio threads

pub mod channels;
pub mod command;
pub mod notification;

// Library root: console transport and command dispatch for the Secret Santa
// bot, exposed so integration tests can drive them.

pub mod console;
pub mod dispatch;

pub mod health;
pub mod hosts;

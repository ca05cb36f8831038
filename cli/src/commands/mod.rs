pub mod admin;
pub mod buy;
pub mod claim;
pub mod events;
pub mod health;
pub mod info;
pub mod multisig;
pub mod pools;
pub mod roll;
pub mod user;
pub mod views;

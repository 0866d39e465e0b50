pub mod currency;
pub mod display_id;
pub mod password;
pub mod phone;
pub mod token;

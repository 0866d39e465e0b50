pub mod bidmodel;
pub mod jobmodel;
pub mod messagemodel;
pub mod paymentmodel;
pub mod usermodel;

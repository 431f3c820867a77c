pub mod charger;
pub mod load_balance;
pub mod mains;
pub mod plan;
pub mod platform;
pub mod presence;
pub mod price;

pub mod spot;
pub mod user;

pub use spot::{NewSpot, TouristSpot};
pub use user::User;

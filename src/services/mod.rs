pub mod auth;
pub mod export;
pub mod recommender;

pub use recommender::Recommender;

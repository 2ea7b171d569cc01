pub mod angle;
pub mod controller;
pub mod models;
pub mod sensor;
pub mod settings;

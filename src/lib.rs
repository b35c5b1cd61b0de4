//! Moodify - mood-based music recommendations
//!
//! Detects the emotion on a user's face from a webcam snapshot and
//! recommends songs tagged with that mood in the user's languages.

pub mod api;
pub mod config;
pub mod db;
pub mod emotion;
pub mod models;
pub mod pages;
pub mod services;

//! Helpers shared by clients, workflows and activities

pub mod payload;

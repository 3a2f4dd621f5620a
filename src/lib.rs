pub mod config;
pub mod controller;
pub mod notify;
pub mod services;
pub mod session;
pub mod supabase;
pub mod validation;

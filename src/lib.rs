//! Core of the chirpy service: a snapshot document store for users, chirps
//! and refresh tokens, plus the credential lifecycle built on top of it.

pub mod api;
pub mod authz;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;

//! SKM admissions: REST API behind the college admin dashboard.
//!
//! Admission applications, contact messages, news posts and bank-transfer
//! details are stored in Sled. Public routes accept submissions and serve
//! published content; admin routes require a bearer session token issued by
//! `POST /api/admin/login` and checked by the access gate.

pub mod auth;
// Token-file session used by the skm-admin binary
pub mod client;
pub mod config;
pub mod error;
// Arrow projection + CSV for the admissions download
pub mod export;
pub mod gate;
pub mod logging;
pub mod models;
// REST API module: Axum HTTP handlers
pub mod rest;
pub mod storage;

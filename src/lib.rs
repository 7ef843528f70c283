// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! CarePartner sync: follow diabetes data shared through Tidepool.
//!
//! This crate keeps a roster of followed accounts in sync with the remote
//! permission list, fetches and merges each followee's data into local
//! caches, and derives presentation-ready state from them.

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::FolloweeManager;
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub manager: Arc<FolloweeManager>,
}

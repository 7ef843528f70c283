// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync engine and remote API client.

pub mod classifier;
pub mod followee;
pub mod manager;
pub mod tidepool;

pub use classifier::{classify, classify_all, ClassifiedBatch, DomainEvent};
pub use followee::{Followee, FolloweeEvent, FetchOutcome};
pub use manager::{FolloweeManager, RosterEvent, RosterRefresh};
pub use tidepool::{RemoteDataClient, SessionProvider, StaticSession, TidepoolClient, TidepoolSession};

//! Mattermost Integration - REST client and WebSocket event stream
//!
//! This crate provides the platform side of meetmatter:
//! - **API** (`api`) - the `ChatApi` seam the bot talks through
//! - **REST** (`rest`) - `reqwest` implementation of `ChatApi` against API v4
//! - **Events** (`events`) - WebSocket frame decoding and event-type routing
//! - **Socket** (`socket`) - WebSocket transport and the reconnecting listen loop
//!
//! # Architecture
//!
//! ```text
//! WebSocket frames → decode_frame → EventDispatcher → EventHandler (bot)
//!                                                        ↓
//!                                    ChatApi (REST) ← reactions / posts
//! ```

pub mod api;
pub mod events;
pub mod rest;
pub mod socket;

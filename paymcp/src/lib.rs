#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Monetization middleware for tool-serving agent runtimes.
//!
//! `paymcp` gates server-side tools behind a payment flow: when a priced
//! tool is invoked, the middleware creates a payment with an external
//! provider, walks the user through completing it, verifies the status, and
//! only then invokes the underlying tool with its original arguments.
//!
//! # Overview
//!
//! The host runtime routes its tool registrations through a [`core::PayMcp`]
//! coordinator. Tools carrying a [`price::PriceInfo`] annotation are wrapped
//! in one of three payment-completion protocols (two-step, progress
//! polling, or elicitation), chosen once per coordinator. In-flight payment
//! state lives in a session-keyed, TTL-bounded [`store::StateStore`] with a
//! payment-id index, which is what makes payment reuse idempotent and
//! recovery after timeouts possible.
//!
//! # Example
//!
//! ```rust,ignore
//! use paymcp::constants::FlowType;
//! use paymcp::core::PayMcp;
//! use paymcp::price::PriceInfo;
//! use paymcp::tool::ToolDef;
//!
//! let paymcp = PayMcp::builder()
//!     .blueprints(paymcp_providers::blueprints())
//!     .providers_config(providers_config)
//!     .flow_type(FlowType::TwoStep)
//!     .build()?;
//!
//! paymcp.register_tool(
//!     &mut runtime,
//!     ToolDef::new("add", "Adds two numbers.", handler)
//!         .priced(PriceInfo::new("0.19".parse()?, "USD")),
//! )?;
//! ```
//!
//! # Modules
//!
//! - [`constants`] - Status vocabulary, flow types, and timing defaults
//! - [`context`] - Per-invocation context and client capabilities
//! - [`core`] - The root coordinator and its builder
//! - [`error`] - Error types for every layer
//! - [`flow`] - The three payment-completion flows
//! - [`messages`] - User-facing prompt text
//! - [`price`] - Price annotation
//! - [`provider`] - Payment provider abstraction and blueprint registry
//! - [`register`] - Explicit tool registrar
//! - [`response`] - Canonical response envelopes
//! - [`state`] - Idempotency and recovery helpers
//! - [`store`] - Session-keyed payment state persistence
//! - [`timestamp`] - Wall-clock timestamps for stored state
//! - [`tool`] - Framework-agnostic tool and runtime traits

pub mod constants;
pub mod context;
pub mod core;
pub mod error;
pub mod flow;
pub mod messages;
pub mod price;
pub mod provider;
pub mod register;
pub mod response;
pub mod state;
pub mod store;
pub mod timestamp;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

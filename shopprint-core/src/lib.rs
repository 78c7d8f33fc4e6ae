#![doc = "shopprint-core: core pipeline library for shopprint."]

//! This crate holds the order → asset → document pipeline: fetching open orders,
//! aggregating their line items, resolving print assets on disk and assembling PDFs.
//! Argument parsing, environment loading and terminal output live in the `shopprint` crate.
//!
//! # Usage
//! Build a [`config::PipelineConfig`] once and pass it by reference into the stages,
//! or call the orchestration helpers in [`pipeline`].

pub mod aggregate;
pub mod assets;
pub mod config;
pub mod contract;
pub mod document;
pub mod download;
pub mod pipeline;
pub mod variant;

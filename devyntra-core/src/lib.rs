//! Devyntra Core
//!
//! Core types shared by the analysis worker and its storage layer.
//!
//! This crate contains:
//! - Domain types: analysis jobs, project records, detected languages
//! - DTOs: the queue payload exchanged with job producers

pub mod domain;
pub mod dto;

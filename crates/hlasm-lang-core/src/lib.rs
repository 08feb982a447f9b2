#![forbid(unsafe_code)]
//! Shared types for the HLASM analyzer workspace.
//!
//! This crate provides the foundational building blocks that the parser and
//! analyzer crates share:
//!
//! - **Source location tracking**: [`Position`], [`Range`], [`Location`]
//! - **Diagnostics**: [`Diagnostic`], [`Severity`]
//! - **Identifier interning**: [`Id`], [`IdPool`]
//! - **Resources**: [`ResourceLocation`]
//!
//! # Design Principles
//!
//! - **Minimal dependencies**: plain Rust types only; the analyzer crates add
//!   `thiserror`/`miette` on top for rich error rendering.
//! - **Shared, not prescriptive**: these types define the common vocabulary;
//!   each crate uses them according to its own needs.

mod diagnostic;
mod ids;
mod resource;
mod span;

pub use diagnostic::{Diagnostic, Severity};
pub use ids::{Id, IdPool};
pub use resource::ResourceLocation;
pub use span::{Location, Position, Range};
